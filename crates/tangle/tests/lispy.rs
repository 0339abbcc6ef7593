//! A small Lisp-like calculator grammar, compiled and evaluated.

use tangle::{compile, AstNode, GrammarTable, Graph};

const LISPY: &str = r"
    number   : /-?[0-9]+/ ;
    operator : '+' | '-' | '*' | '/' ;
    expr     : <number> | '(' <operator> <expr>+ ')' ;
    lispy    : /^/ <operator> <expr>+ /$/ ;
";

fn lispy() -> (Graph, GrammarTable) {
    let mut graph = Graph::new();
    let rules: Vec<_> = ["number", "operator", "expr", "lispy"]
        .into_iter()
        .map(|name| graph.rule(name))
        .collect();
    let table = compile(&mut graph, LISPY, &rules).unwrap();
    (graph, table)
}

fn eval(node: &AstNode) -> i64 {
    if node.has_tag("number") {
        return node.contents().parse().unwrap();
    }
    let operator = node.find("operator").unwrap().contents();
    let args: Vec<i64> = node
        .children()
        .iter()
        .filter(|child| child.has_tag("expr"))
        .map(eval)
        .collect();
    match (operator, args.as_slice()) {
        ("-", [only]) => -only,
        ("+", _) => args.iter().sum(),
        ("*", _) => args.iter().product(),
        ("-", [first, rest @ ..]) => rest.iter().fold(*first, |acc, n| acc - n),
        ("/", [first, rest @ ..]) => rest.iter().fold(*first, |acc, n| acc / n),
        _ => panic!("cannot evaluate {operator} over {args:?}"),
    }
}

fn read_eval(input: &str) -> i64 {
    let (graph, table) = lispy();
    eval(&graph.run(table["lispy"], input).unwrap())
}

#[test]
fn tree_shape() {
    let (graph, table) = lispy();
    let node = graph.run(table["lispy"], "+ 1 (* 7 5) 3").unwrap();
    assert_eq!(node.tag(), "lispy");

    let tags: Vec<_> = node.children().iter().map(AstNode::tag).collect();
    assert_eq!(tags, vec!["operator", "expr|number", "expr", "expr|number"]);

    let nested = node.child(2);
    let texts: Vec<_> = nested.children().iter().map(AstNode::contents).collect();
    assert_eq!(texts, vec!["(", "*", "7", "5", ")"]);
}

#[test]
fn evaluates_integer_math() {
    let cases = [
        ("+ 1 1", 2),
        ("+ 2 -3", -1),
        ("- 3 2", 1),
        ("- 100", -100),
        ("* -2 -3", 6),
        ("/ 7 3", 2),
        ("- (* 10 10) (+ 1 1 1)", 97),
        ("+ 1 (* 7 5) 3", 39),
        ("*     55     101     (+ 0 0 0)", 0),
    ];
    for (input, want) in cases {
        assert_eq!(read_eval(input), want, "evaluating {input:?}");
    }
}

#[test]
fn reports_position_of_bad_input() {
    let (graph, table) = lispy();
    let err = graph.run(table["lispy"], "+ 1 (* 7 5").unwrap_err();
    assert_eq!(err.position().offset, 10);
    assert!(err.expects("')'"));
    assert!(err.to_string().starts_with("1:11: error: expected"));

    let err = graph.run(table["lispy"], "% 1 2").unwrap_err();
    assert_eq!(err.position().offset, 0);
    assert!(err.expects("'+'"));
}

#[test]
fn cleanup_releases_everything() {
    let (mut graph, table) = lispy();
    let released = graph.cleanup(&table.roots());
    assert!(released > 0);
    assert!(graph.is_empty());
}
