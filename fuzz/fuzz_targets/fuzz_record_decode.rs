#![no_main]
use dispenser_core::PersistedRecord;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = PersistedRecord::decode(data) {
        assert!(record.left_l.is_finite() && record.left_l >= 0.0);
        assert!(record.right_l.is_finite() && record.right_l >= 0.0);
        assert_eq!(PersistedRecord::decode(&record.encode()), Ok(record));
    }
});
