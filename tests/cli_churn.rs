use std::fs;
use std::process::Command;

use tempfile::tempdir;

const METRICS: &str = "subject_id\trecency\tfrequency\tmonetary\tage\tsession_count\tavg_session_duration\tchurned\ttenure_days\n\
c01\t75\t2\t120.0\t34\t5\t2.5\t1\t8\n\
c02\t68\t3\t90.5\t41\t7\t3.0\t1\t15\n\
c03\t61\t1\t40.0\t29\t3\t1.5\t1\t11\n\
c04\t55\t4\t300.0\t52\t12\t4.0\t1\t26\n\
c05\t48\t2\t75.0\t38\t6\t2.0\t0\t90\n\
c06\t40\t5\t410.0\t45\t15\t5.5\t1\t33\n\
c07\t30\t6\t520.0\t60\t20\t6.0\t0\t90\n\
c08\t22\t3\t150.0\t27\t9\t3.5\t1\t64\n\
c09\t12\t8\t800.0\t49\t30\t7.0\t0\t90\n\
c10\t5\t9\t950.0\t55\t35\t8.5\t0\t90\n";

#[test]
fn train_then_predict_writes_predictions() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = tmp.path().join("metrics.tsv");
    fs::write(&data_path, METRICS).expect("write metrics");

    let exe = env!("CARGO_BIN_EXE_churnsurv");
    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args(["train", data_path.to_str().expect("path str")])
        .status()
        .expect("run churnsurv train");
    assert!(status.success(), "train exited with status {status:?}");
    let model_path = tmp.path().join("model.toml");
    assert!(model_path.exists(), "model.toml missing");

    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args([
            "predict",
            data_path.to_str().expect("path str"),
            "--model",
            model_path.to_str().expect("path str"),
        ])
        .status()
        .expect("run churnsurv predict");
    assert!(status.success(), "predict exited with status {status:?}");

    let predictions = fs::read_to_string(tmp.path().join("predictions.tsv")).expect("predictions");
    let mut lines = predictions.lines();
    assert_eq!(
        lines.next(),
        Some("subject_id\tchurn_probability\texpected_time_to_event\ttop_risk_factor")
    );
    let rows: Vec<_> = lines.collect();
    assert_eq!(rows.len(), 10);
    for row in rows {
        let fields: Vec<_> = row.split('\t').collect();
        let p: f64 = fields[1].parse().expect("probability");
        assert!((0.0..=1.0).contains(&p));
    }
}

#[test]
fn explain_reports_unknown_subject() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = tmp.path().join("metrics.tsv");
    fs::write(&data_path, METRICS).expect("write metrics");
    let exe = env!("CARGO_BIN_EXE_churnsurv");

    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args(["train", data_path.to_str().expect("path str")])
        .status()
        .expect("run churnsurv train");
    assert!(status.success());

    let output = Command::new(exe)
        .current_dir(tmp.path())
        .args([
            "explain",
            data_path.to_str().expect("path str"),
            "--model",
            "model.toml",
            "--subject",
            "nobody",
        ])
        .output()
        .expect("run churnsurv explain");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nobody"));
}

#[test]
fn missing_column_fails_cleanly() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = tmp.path().join("broken.tsv");
    fs::write(&data_path, "subject_id\trecency\nc1\t4\n").expect("write metrics");

    let output = Command::new(env!("CARGO_BIN_EXE_churnsurv"))
        .current_dir(tmp.path())
        .args(["train", data_path.to_str().expect("path str")])
        .output()
        .expect("run churnsurv train");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("frequency"));
}
