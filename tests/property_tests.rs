//! Property tests for the WHERE compiler and pagination arithmetic.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use dbflow::query::{
    Logic, Operand, Operator, PredicateNode, QueryState, build_count, build_select, compile,
};
use dbflow::{Page, Value};
use proptest::prelude::*;

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        "[a-z ?']{0,8}".prop_map(Value::Text),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ]
}

fn logic() -> impl Strategy<Value = Logic> {
    prop_oneof![Just(Logic::And), Just(Logic::Or)]
}

fn column() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("id".to_string()),
        Just("name".to_string()),
        Just("u.age".to_string()),
        Just("status".to_string()),
    ]
}

fn single_operator() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::Eq),
        Just(Operator::Ne),
        Just(Operator::Lt),
        Just(Operator::Le),
        Just(Operator::Gt),
        Just(Operator::Ge),
        Just(Operator::Like),
        Just(Operator::FindInSet),
    ]
}

fn leaf() -> impl Strategy<Value = PredicateNode> {
    prop_oneof![
        (column(), single_operator(), value(), logic()).prop_map(|(c, op, v, l)| {
            PredicateNode::leaf(c, op, Operand::Single(v), l).unwrap()
        }),
        (column(), value(), value(), logic()).prop_map(|(c, low, high, l)| {
            PredicateNode::leaf(c, Operator::Between, Operand::Pair(low, high), l).unwrap()
        }),
        (column(), prop::collection::vec(value(), 0..6), logic()).prop_map(|(c, vs, l)| {
            PredicateNode::leaf(c, Operator::In, Operand::List(vs), l).unwrap()
        }),
        (prop::collection::vec(value(), 0..4), logic()).prop_map(|(params, l)| {
            let sql = if params.is_empty() {
                "1 = 1".to_string()
            } else {
                format!("`raw` IN({})", vec!["?"; params.len()].join(","))
            };
            PredicateNode::raw(l, &sql, params)
        }),
    ]
}

fn nodes() -> impl Strategy<Value = Vec<PredicateNode>> {
    let node = leaf().prop_recursive(4, 48, 6, |inner| {
        (logic(), prop::collection::vec(inner, 0..6))
            .prop_map(|(logic, nodes)| PredicateNode::Group { logic, nodes })
    });
    prop::collection::vec(node, 0..8)
}

/// Parameters in the order a depth-first walk meets them.
fn flatten(nodes: &[PredicateNode], out: &mut Vec<Value>) {
    for node in nodes {
        match node {
            PredicateNode::Leaf { operand, .. } => match operand {
                Operand::Single(v) => out.push(v.clone()),
                Operand::Pair(low, high) => {
                    out.push(low.clone());
                    out.push(high.clone());
                },
                Operand::List(values) => out.extend(values.iter().cloned()),
            },
            PredicateNode::Raw { params, .. } => out.extend(params.iter().cloned()),
            PredicateNode::Group { nodes, .. } => flatten(nodes, out),
        }
    }
}

proptest! {
    #[test]
    fn prop_placeholders_match_params(tree in nodes()) {
        let (sql, params) = compile(&tree);
        prop_assert_eq!(sql.matches('?').count(), params.len());
    }

    #[test]
    fn prop_params_follow_traversal_order(tree in nodes()) {
        let (_, params) = compile(&tree);
        let mut expected = Vec::new();
        flatten(&tree, &mut expected);
        prop_assert_eq!(params, expected);
    }

    #[test]
    fn prop_compile_is_deterministic(tree in nodes()) {
        prop_assert_eq!(compile(&tree), compile(&tree));
    }

    #[test]
    fn prop_fragment_has_no_leading_connective(tree in nodes()) {
        let (sql, _) = compile(&tree);
        prop_assert!(!sql.starts_with(' '));
        prop_assert!(!sql.starts_with("AND "));
        prop_assert!(!sql.starts_with("OR "));
    }

    #[test]
    fn prop_between_binds_low_then_high(
        prefix in prop::collection::vec(leaf(), 0..5),
        low in any::<i64>(),
        high in any::<i64>(),
    ) {
        let mut before = Vec::new();
        flatten(&prefix, &mut before);
        let mut tree = prefix;
        tree.push(
            PredicateNode::leaf("age", Operator::Between, (low, high), Logic::And).unwrap(),
        );

        let (sql, params) = compile(&tree);
        prop_assert!(sql.ends_with("`age` BETWEEN ? AND ?"));
        prop_assert_eq!(&params[before.len()], &Value::Int(low));
        prop_assert_eq!(&params[before.len() + 1], &Value::Int(high));
    }

    #[test]
    fn prop_select_binds_projection_before_where(
        tree in nodes(),
        bindings in prop::collection::vec(value(), 0..3),
    ) {
        let mut state = QueryState::new("users");
        state.select = vec!["?"; bindings.len()]
            .into_iter()
            .chain(["id"])
            .collect::<Vec<_>>()
            .join(",");
        state.select_params.clone_from(&bindings);
        state.predicates = tree.clone();

        let stmt = build_select(&state).unwrap();
        prop_assert_eq!(stmt.sql.matches('?').count(), stmt.params.len());

        let mut expected = bindings;
        flatten(&tree, &mut expected);
        prop_assert_eq!(stmt.params, expected);
    }

    #[test]
    fn prop_count_placeholders_match_params(
        tree in nodes(),
        bindings in prop::collection::vec(value(), 0..3),
        grouped in any::<bool>(),
    ) {
        let mut state = QueryState::new("users");
        state.select = vec!["?"; bindings.len()]
            .into_iter()
            .chain(["status"])
            .collect::<Vec<_>>()
            .join(",");
        state.select_params.clone_from(&bindings);
        state.predicates = tree.clone();
        if grouped {
            state.group_by = "status".to_string();
        }

        let stmt = build_count(&state).unwrap();
        prop_assert_eq!(stmt.sql.matches('?').count(), stmt.params.len());

        let mut expected = if grouped { bindings } else { Vec::new() };
        flatten(&tree, &mut expected);
        prop_assert_eq!(stmt.params, expected);
    }

    #[test]
    fn prop_total_pages_is_ceiling(p in 1_u64..1000, limit in 1_u64..500, total in 0_u64..1_000_000) {
        let mut page = Page::new(p, limit);
        page.record_total(total);
        prop_assert_eq!(page.total, total);
        prop_assert!(page.total_pages * limit >= total);
        prop_assert!(page.total_pages == 0 || (page.total_pages - 1) * limit < total);
        prop_assert_eq!(page.offset(), (p - 1) * limit);
    }
}
