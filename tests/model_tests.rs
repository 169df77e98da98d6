//! End-to-end scenarios exercising the full pipeline: lexing, causalization,
//! block compilation, and the period driver together.

use simblock::{ModelError, Model, Panel};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn trivial_two_by_two() {
    let equations = strings(&["x + y = a", "x - y = b"]);
    let endogenous = strings(&["x", "y"]);
    let model = Model::build(&equations, &endogenous).unwrap();
    assert_eq!(model.blocks().len(), 1);
    assert_eq!(model.blocks()[0].endogenous.len(), 2);

    let columns = strings(&["a", "b", "x", "y"]);
    let mut panel = Panel::from_rows(&columns, vec![vec![4.0, 2.0, 0.0, 0.0]]).unwrap();
    let diagnostics = model.solve(&mut panel).unwrap();
    assert!(diagnostics.is_empty());
    assert!((panel.get(0, "x").unwrap() - 3.0).abs() < 1e-6);
    assert!((panel.get(0, "y").unwrap() - 1.0).abs() < 1e-6);
}

#[test]
fn cascade_two_blocks_in_order() {
    let equations = strings(&["y = 2 * x + 1", "z = y + x"]);
    let endogenous = strings(&["y", "z"]);
    let model = Model::build(&equations, &endogenous).unwrap();
    assert_eq!(model.blocks().len(), 2);
    assert_eq!(model.blocks()[0].endogenous, vec!["y".to_string()]);
    assert_eq!(model.blocks()[1].endogenous, vec!["z".to_string()]);

    let columns = strings(&["x", "y", "z"]);
    let mut panel = Panel::from_rows(&columns, vec![vec![3.0, 0.0, 0.0]]).unwrap();
    let diagnostics = model.solve(&mut panel).unwrap();
    assert!(diagnostics.is_empty());
    assert!((panel.get(0, "y").unwrap() - 7.0).abs() < 1e-6);
    assert!((panel.get(0, "z").unwrap() - 10.0).abs() < 1e-6);
}

#[test]
fn lagged_equation_accumulates_across_periods() {
    let equations = strings(&["y = y(-1) + x"]);
    let endogenous = strings(&["y"]);
    let model = Model::build(&equations, &endogenous).unwrap();
    assert_eq!(model.max_lag(), 1);

    let columns = strings(&["x", "y"]);
    let mut panel = Panel::from_rows(
        &columns,
        vec![
            vec![0.0, 10.0],
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![3.0, 0.0],
        ],
    )
    .unwrap();

    let diagnostics = model.solve(&mut panel).unwrap();
    assert!(diagnostics.is_empty());
    assert!((panel.get(1, "y").unwrap() - 11.0).abs() < 1e-6);
    assert!((panel.get(2, "y").unwrap() - 13.0).abs() < 1e-6);
    assert!((panel.get(3, "y").unwrap() - 16.0).abs() < 1e-6);
}

#[test]
fn simultaneous_pair_forms_one_block() {
    let equations = strings(&["x = 2 * y + 1", "y = 3 * x + 2"]);
    let endogenous = strings(&["x", "y"]);
    let model = Model::build(&equations, &endogenous).unwrap();
    assert_eq!(model.blocks().len(), 1);
    assert_eq!(model.blocks()[0].endogenous.len(), 2);

    let columns = strings(&["x", "y"]);
    let mut panel = Panel::from_rows(&columns, vec![vec![0.0, 0.0]]).unwrap();
    let diagnostics = model.solve(&mut panel).unwrap();
    assert!(diagnostics.is_empty());
    assert!((panel.get(0, "x").unwrap() - (-1.0)).abs() < 1e-6);
    assert!((panel.get(0, "y").unwrap() - (-1.0)).abs() < 1e-6);
}

#[test]
fn singular_jacobian_stops_solve() {
    let equations = strings(&["x + y = a", "2 * x + 2 * y = b"]);
    let endogenous = strings(&["x", "y"]);
    let model = Model::build(&equations, &endogenous).unwrap();
    assert_eq!(model.blocks().len(), 1);

    let columns = strings(&["a", "b", "x", "y"]);
    let mut panel = Panel::from_rows(&columns, vec![vec![4.0, 8.0, 0.0, 0.0]]).unwrap();
    let err = model.solve(&mut panel).unwrap_err();
    assert!(matches!(err, ModelError::SingularJacobian { .. }));
}

#[test]
fn over_determined_model_fails_at_construction() {
    let equations = strings(&["x = 1", "x = 2"]);
    let endogenous = strings(&["x"]);
    let err = Model::build(&equations, &endogenous).unwrap_err();
    assert!(matches!(err, ModelError::StructuralSingularity { .. }));
}
