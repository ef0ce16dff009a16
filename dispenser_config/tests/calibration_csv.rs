use std::fs::File;
use std::io::Write;

use dispenser_config::{CalibrationRow, LinearFit, load_calibration_csv};
use rstest::rstest;
use tempfile::tempdir;

fn row(raw: i64, value: f64) -> CalibrationRow {
    CalibrationRow { raw, value }
}

#[rstest]
fn two_point_fit_is_exact() {
    // 4 mA and 20 mA anchors for 0.9..15 L/min at 16-bit
    let fit = LinearFit::from_rows(&[row(5846, 0.9), row(29238, 15.0)]).unwrap();
    assert!((fit.gain * 5846.0 + fit.offset - 0.9).abs() < 1e-9);
    assert!((fit.gain * 29238.0 + fit.offset - 15.0).abs() < 1e-9);
}

#[rstest]
fn three_collinear_points() {
    let fit = LinearFit::from_rows(&[row(100, 0.0), row(150, 100.0), row(200, 200.0)]).unwrap();
    assert!((fit.gain - 2.0).abs() < 1e-9);
    assert!((fit.offset + 200.0).abs() < 1e-9);
}

#[rstest]
fn decreasing_raw_is_accepted() {
    let fit = LinearFit::from_rows(&[row(300, 0.0), row(200, 10.0), row(100, 20.0)]).unwrap();
    assert!((fit.gain + 0.1).abs() < 1e-9);
}

#[rstest]
#[case(vec![row(100, 0.0)], "at least two rows")]
#[case(vec![row(100, 0.0), row(100, 1.0)], "duplicate raw")]
#[case(vec![row(100, 0.0), row(200, 1.0), row(150, 2.0)], "monotonic")]
#[case(vec![row(100, 5.0), row(200, 5.0)], "unusable slope")]
fn rejects_bad_rows(#[case] rows: Vec<CalibrationRow>, #[case] expected: &str) {
    let err = LinearFit::from_rows(&rows).unwrap_err();
    assert!(format!("{err}").contains(expected), "{err}");
}

#[rstest]
fn loads_csv_with_whitespace() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flow.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "raw, value").unwrap();
    writeln!(f, "1000, 1.0").unwrap();
    writeln!(f, "2000, 2.0").unwrap();
    writeln!(f, "3000, 3.0").unwrap();
    drop(f);

    let fit = load_calibration_csv(&path).unwrap();
    assert!((fit.gain - 0.001).abs() < 1e-12);
    assert!(fit.offset.abs() < 1e-9);
}

#[rstest]
fn csv_with_wrong_headers_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    std::fs::write(&path, "raw,litres\n1,2\n3,4\n").unwrap();
    let err = load_calibration_csv(&path).unwrap_err();
    assert!(format!("{err}").contains("headers 'raw,value'"));
}

#[rstest]
fn csv_with_bad_row_reports_line() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    std::fs::write(&path, "raw,value\n1,2\nabc,4\n").unwrap();
    let err = load_calibration_csv(&path).unwrap_err();
    assert!(format!("{err}").contains("invalid CSV row 3"));
}
