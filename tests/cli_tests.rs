//! Exercises the `simblock` binary end-to-end: equation file + endogenous
//! list + CSV panel in, solved CSV panel out.

use std::fs;
use std::process::Command;

use tempfile::tempdir;

#[test]
fn solves_cascade_via_cli() {
    let dir = tempdir().unwrap();
    let equations_path = dir.path().join("equations.txt");
    let panel_path = dir.path().join("panel.csv");
    let output_path = dir.path().join("solved.csv");

    fs::write(&equations_path, "y = 2 * x + 1\nz = y + x\n").unwrap();
    fs::write(&panel_path, "x,y,z\n3,0,0\n").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_simblock"))
        .arg(&equations_path)
        .arg("--endogenous")
        .arg("y,z")
        .arg(&panel_path)
        .arg("--output")
        .arg(&output_path)
        .status()
        .unwrap();
    assert!(status.success());

    let solved = fs::read_to_string(&output_path).unwrap();
    let mut lines = solved.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();
    let row: Vec<f64> = lines
        .next()
        .unwrap()
        .split(',')
        .map(|s| s.parse().unwrap())
        .collect();

    let y_idx = header.iter().position(|&c| c == "y").unwrap();
    let z_idx = header.iter().position(|&c| c == "z").unwrap();
    assert!((row[y_idx] - 7.0).abs() < 1e-6);
    assert!((row[z_idx] - 10.0).abs() < 1e-6);
}
