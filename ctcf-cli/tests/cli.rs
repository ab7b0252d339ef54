use assert_cmd::Command;
use std::fs;

const FIMO: &str = "\
motif_id\tmotif_alt_id\tsequence_name\tstart\tstop\tstrand\tscore\tp-value\tq-value\tmatched_sequence
MA0139.1\tCTCF\tchr2:50-550\t3\t21\t+\t18.0\t1e-5\t0.01\tCCACCAGGGGGCGC
MA0139.1\tCTCF\tchr1:1000-1500\t12\t30\t+\t15.2\t0.5\t0.9\tCCGCGNGGNGGCAG
MA0139.1\tCTCF\tchr1:1000-1500\t212\t230\t-\t20.1\t0.01\t0.2\tCCGCGNGGNGGCAG
";

#[test]
fn process_fimo_scores_wrong_arity() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fimo.tsv");
    let output = dir.path().join("scores.tsv");
    fs::write(&input, FIMO).unwrap();

    for args in [vec![], vec![input.as_os_str()], vec![input.as_os_str(), output.as_os_str(), input.as_os_str()]] {
        let out = Command::cargo_bin("process_fimo_scores").unwrap().args(&args).output().unwrap();
        assert_eq!(out.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&out.stderr).contains("Usage"));
        assert!(!output.exists());
    }
}

#[test]
fn process_fimo_scores_writes_best_hits() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fimo.tsv");
    let output = dir.path().join("scores.tsv");
    fs::write(&input, FIMO).unwrap();

    Command::cargo_bin("process_fimo_scores").unwrap()
        .arg(&input).arg(&output)
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "region\tmotif_score\nchr1:1000-1500\t2.0\nchr2:50-550\t5.0\n",
    );
}

#[test]
fn process_fimo_scores_missing_columns() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fimo.tsv");
    let output = dir.path().join("scores.tsv");
    fs::write(&input, "motif_id\tsequence_name\tstart\tstop\nMA0139.1\tchr1:1-2\t1\t2\n").unwrap();

    let out = Command::cargo_bin("process_fimo_scores").unwrap()
        .arg(&input).arg(&output)
        .output().unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("p-value"));
    assert!(!output.exists());
}

#[test]
fn ctcf_build_dataset_and_predict() {
    let dir = tempfile::tempdir().unwrap();
    let path = |name: &str| dir.path().join(name);
    for (prefix, n) in [("pos", 10), ("neg", 10)] {
        let mut scores = String::from("region\tmotif_score\n");
        let mut bed = String::new();
        let mut signal = String::new();
        for i in 0..n {
            let start = i * 1000;
            scores.push_str(&format!("chr1:{}-{}\t{}\n", start + 10, start + 30, i + 1));
            bed.push_str(&format!("chr1\t{}\t{}\t{}_{}\n", start, start + 500, prefix, i));
            signal.push_str(&format!("{}_{}\t500\t400\t{}\t0.5\t{}\n", prefix, i, i * 10, i as f64 * 0.02));
        }
        fs::write(path(&format!("{}_scores.tsv", prefix)), scores).unwrap();
        fs::write(path(&format!("{}.bed", prefix)), bed).unwrap();
        fs::write(path(&format!("{}.tab", prefix)), signal).unwrap();
    }

    Command::cargo_bin("ctcf").unwrap()
        .arg("build-dataset")
        .arg("--pos-scores").arg(path("pos_scores.tsv"))
        .arg("--pos-regions").arg(path("pos.bed"))
        .arg("--pos-signal").arg(path("pos.tab"))
        .arg("--neg-scores").arg(path("neg_scores.tsv"))
        .arg("--neg-regions").arg(path("neg.bed"))
        .arg("--neg-signal").arg(path("neg.tab"))
        .arg("--out-dir").arg(path("features"))
        .assert()
        .success();
    let combined = fs::read_to_string(path("features/final_dataset.csv")).unwrap();
    assert_eq!(combined.lines().next(), Some("region,motif_score,chip_signal,label"));
    assert_eq!(combined.lines().count(), 21);
    let test = fs::read_to_string(path("features/test_dataset.csv")).unwrap();
    assert_eq!(test.lines().count(), 5);

    fs::write(path("draws.csv"), "\
alpha,beta_motif,mu_0,sigma_0,mu_1,sigma_1
0.0,0.0,0.1,1.0,0.1,1.0
0.0,0.0,0.1,1.0,0.1,1.0
").unwrap();
    Command::cargo_bin("ctcf").unwrap()
        .arg("predict").arg(path("features/final_dataset.csv"))
        .arg("--draws").arg(path("draws.csv"))
        .arg("-o").arg(path("predictions.csv"))
        .assert()
        .success();
    let predictions = fs::read_to_string(path("predictions.csv")).unwrap();
    let lines: Vec<&str> = predictions.lines().collect();
    assert_eq!(lines.len(), 21);
    assert_eq!(lines[0], "posterior_prediction");
    assert!(lines[1..].iter().all(|x| *x == "0.5"));
}

#[test]
fn ctcf_downsample() {
    let dir = tempfile::tempdir().unwrap();
    let mut table = String::from("region,motif_score,chip_signal,label\n");
    for i in 0..30 {
        table.push_str(&format!("r{},{},1.5,{}\n", i, i, i % 2));
    }
    let input = dir.path().join("train_dataset.csv");
    fs::write(&input, table).unwrap();

    Command::cargo_bin("ctcf").unwrap()
        .args(["downsample", "-n", "12"]).arg(&input)
        .assert()
        .success();
    let sample = fs::read_to_string(dir.path().join("training_data.csv")).unwrap();
    assert_eq!(sample.lines().count(), 13);

    Command::cargo_bin("ctcf").unwrap()
        .args(["downsample", "-n", "31"]).arg(&input)
        .assert()
        .failure();
}
