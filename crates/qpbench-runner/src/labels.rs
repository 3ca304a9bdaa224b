//! Display labels for solver configurations.

use std::collections::BTreeMap;

use crate::solver_set::{OptionValue, SolverConfigSet, SolverOptions};

const LABEL_ATTRIBUTES: [&str; 7] = [
    "qp_solver", "tol_stat", "tol_eq", "tol_ineq", "tol_comp", "iter_max", "cond_N",
];

pub fn shorten_solver_name(name: &str) -> String {
    name.replace("PARTIAL_CONDENSING_", "PCOND ")
        .replace("FULL_CONDENSING_", "FCOND ")
}

fn attribute(options: &SolverOptions, name: &str) -> OptionValue {
    if name == "qp_solver" {
        return OptionValue::Text(options.qp_solver.as_str().to_string());
    }
    options.get(name).unwrap_or(OptionValue::Unset)
}

/// Maps solver id to a label naming only the attributes that differ
/// between the configurations.
pub fn generate_labels(solvers: &SolverConfigSet) -> BTreeMap<String, String> {
    let configs: Vec<&SolverOptions> = solvers.iter().map(|c| &c.options).collect();
    let mut labels = BTreeMap::new();
    let Some(first) = configs.first().copied() else {
        return labels;
    };
    if configs.len() == 1 {
        labels.insert(first.identity(), first.qp_solver.as_str().to_string());
        return labels;
    }

    let differing: Vec<&str> = LABEL_ATTRIBUTES
        .iter()
        .copied()
        .filter(|attr| {
            let reference = attribute(first, attr);
            configs.iter().any(|o| attribute(o, attr) != reference)
        })
        .collect();

    for options in configs {
        let label = match differing.as_slice() {
            [] => options.qp_solver.as_str().to_string(),
            ["qp_solver"] => shorten_solver_name(options.qp_solver.as_str()),
            attrs => attrs
                .iter()
                .map(|attr| match attribute(options, attr) {
                    OptionValue::Text(kind) if *attr == "qp_solver" => shorten_solver_name(&kind),
                    OptionValue::Float(v) if v < 0.01 => format!("{}={:.0e}", attr, v),
                    other => format!("{}={}", attr, other.render()),
                })
                .collect::<Vec<_>>()
                .join(", "),
        };
        labels.insert(options.identity(), label);
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver_set::{create_solver_options, SolverKind};

    #[test]
    fn single_configuration_uses_kind_name() {
        let set = SolverConfigSet::from_kind_names(&["FULL_CONDENSING_DAQP"], &[]);
        let labels = generate_labels(&set);
        assert_eq!(labels["FULL_CONDENSING_DAQP"], "FULL_CONDENSING_DAQP");
        assert!(generate_labels(&SolverConfigSet::default()).is_empty());
    }

    #[test]
    fn only_kinds_differ_gives_short_names() {
        let set = SolverConfigSet::from_kind_names(
            &["PARTIAL_CONDENSING_HPIPM", "FULL_CONDENSING_HPIPM"],
            &[],
        );
        let labels = generate_labels(&set);
        assert_eq!(labels["PARTIAL_CONDENSING_HPIPM"], "PCOND HPIPM");
        assert_eq!(labels["FULL_CONDENSING_HPIPM"], "FCOND HPIPM");
    }

    #[test]
    fn differing_options_are_listed() {
        let tight = create_solver_options(
            SolverKind::FullCondensingHpipm,
            &[("tol_stat", OptionValue::Float(1e-10)), ("iter_max", OptionValue::Int(50))],
        )
        .expect("tight");
        let set = SolverConfigSet::from_options(vec![
            SolverOptions::new(SolverKind::FullCondensingHpipm),
            tight.clone(),
        ]);
        let labels = generate_labels(&set);
        assert_eq!(labels["FULL_CONDENSING_HPIPM"], "tol_stat=1e-8, iter_max=1000");
        assert_eq!(labels[&tight.identity()], "tol_stat=1e-10, iter_max=50");
    }

    #[test]
    fn kind_and_options_together() {
        let set = SolverConfigSet::from_options(vec![
            SolverOptions::new(SolverKind::PartialCondensingOsqp),
            create_solver_options(SolverKind::FullCondensingDaqp, &[("cond_N", OptionValue::Int(5))])
                .expect("daqp"),
        ]);
        let labels = generate_labels(&set);
        assert_eq!(labels["PARTIAL_CONDENSING_OSQP"], "PCOND OSQP, cond_N=none");
        assert_eq!(labels["FULL_CONDENSING_DAQP_cond_N=5"], "FCOND DAQP, cond_N=5");
    }
}
