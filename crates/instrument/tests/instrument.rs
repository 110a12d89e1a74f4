//! End-to-end checks over the instrumentation engine: instrumented output
//! must still parse, line numbering must survive, and the static maps must
//! describe the probes that were injected.

use solcov_instrument::{
    BranchKind, InstrumentConfig, Instrumenter, ProbeKind,
};
use std::{collections::BTreeSet, path::Path};

fn instrument(src: &str) -> solcov_instrument::InstrumentOutput {
    Instrumenter::new(InstrumentConfig::default())
        .instrument(Path::new("contracts/Fixture.sol"), src)
        .unwrap()
}

#[test]
fn instrumented_source_still_parses() {
    let src = "contract A {\n    uint x;\n    function f(uint v) public {\n        if (v == 1) {\n            x = 2;\n        }\n        require(v > 0 && v < 10, \"range\");\n        for (uint i = 0; i < v; i++) {\n            x += i;\n        }\n    }\n}\n";
    let out = instrument(src);
    solang_parser::parse(&out.source, 0).expect("instrumented source must parse");
}

#[test]
fn injection_preserves_line_numbering() {
    let src = "contract A {\n    function f(uint v) public returns (uint) {\n        if (v == 1) {\n            return 2;\n        }\n        return v;\n    }\n}\n";
    let out = instrument(src);
    assert_eq!(out.source.lines().count(), src.lines().count());
}

#[test]
fn if_statement_gets_statement_and_branch_records() {
    let out = instrument(
        "contract A { uint x; function f(uint v) public { if (v == 1) { x = 2; } } }",
    );
    // The `if` itself and its body assignment.
    assert_eq!(out.unit.statement_map.len(), 2);
    assert_eq!(out.unit.function_map.len(), 1);
    assert_eq!(out.unit.function_map[&1].name, "f");
    assert_eq!(out.unit.branch_map.len(), 1);
    assert_eq!(out.unit.branch_map[&1].kind, BranchKind::If);
    // No `else` in the source, so one is synthesized for the untaken path.
    assert!(out.source.contains("else {"), "{}", out.source);
}

#[test]
fn require_gets_pre_and_post_probes() {
    let out = instrument(
        "contract A { function f(uint v) public pure { require(v > 0, \"zero\"); } }",
    );
    assert_eq!(out.unit.branch_map[&1].kind, BranchKind::Assert);
    let pre = out.table.iter().filter(|(_, e)| e.kind == ProbeKind::RequirePre).count();
    let post = out.table.iter().filter(|(_, e)| e.kind == ProbeKind::RequirePost).count();
    assert_eq!((pre, post), (1, 1));
}

#[test]
fn short_circuit_operands_are_wrapped() {
    let out = instrument(
        "contract A { function f(uint v) public pure returns (bool) { if (v > 0 && v < 10) { return true; } return false; } }",
    );
    // One branch for the `if`, one for the `&&`.
    assert_eq!(out.unit.branch_map.len(), 2);
    assert!(out
        .unit
        .branch_map
        .values()
        .any(|b| b.kind == BranchKind::CondExpr));
    assert!(out.source.contains("c_true"), "{}", out.source);
    solang_parser::parse(&out.source, 0).expect("wrapped condition must parse");
}

#[test]
fn ternary_declaration_is_rewritten_to_tuple_assignment() {
    let out = instrument(
        "contract A { function f(uint v) public pure returns (uint) { uint y = v > 1 ? v : 0; return y; } }",
    );
    assert!(out.source.contains("uint y; (, y) ="), "{}", out.source);
    assert!(out
        .unit
        .branch_map
        .values()
        .any(|b| b.kind == BranchKind::CondExpr));
    solang_parser::parse(&out.source, 0).expect("rewritten ternary must parse");
}

#[test]
fn helpers_are_scoped_per_contract() {
    let out = instrument(
        "contract A { function f() public {} }\ncontract B { function g() public {} }\n",
    );
    // c_, c_true and c_false per scope, two scopes.
    assert_eq!(out.source.matches("function c_").count(), 6);
    let a_suffix = suffix_after(&out.source, "contract A {");
    let b_suffix = suffix_after(&out.source, "contract B {");
    assert_ne!(a_suffix, b_suffix);
}

fn suffix_after(source: &str, anchor: &str) -> String {
    let at = source.find(anchor).unwrap() + anchor.len();
    let rest = &source[at..];
    let at = rest.find("function c_").unwrap() + "function c_".len();
    rest[at..].chars().take(8).collect()
}

#[test]
fn interfaces_and_bodyless_functions_are_untouched() {
    let out = instrument(
        "interface IA { function f() external; }\ncontract A { function f() public virtual {} }\n",
    );
    assert!(out.table.iter().all(|(_, e)| e.kind == ProbeKind::Function));
    assert_eq!(out.unit.function_map.len(), 1);
    // The interface body carries no helper declarations.
    let iface_end = out.source.find("contract A").unwrap();
    assert!(!out.source[..iface_end].contains("function c_"));
}

#[test]
fn receive_counts_as_function_without_statements() {
    let out = instrument("contract A { receive() external payable { } }");
    assert_eq!(out.unit.function_map.len(), 1);
    assert_eq!(out.unit.function_map[&1].name, "receive");
    assert!(out.unit.statement_map.is_empty());
}

#[test]
fn probe_count_matches_table_size_and_ids_are_monotonic() {
    let out = instrument(
        "contract A {\n    uint x;\n    function f(uint v) public {\n        if (v == 1) {\n            x = 2;\n        }\n    }\n}\n",
    );
    // 1 function probe, 2 line probes, 2 statement probes, 2 branch outcome
    // probes; a marker collision would shrink the table below that.
    assert_eq!(out.table.len(), 7);
    assert!(out.unit.function_map.keys().copied().eq(1..=1));
    assert!(out.unit.statement_map.keys().copied().eq(1..=2));
    assert!(out.unit.branch_map.keys().copied().eq(1..=1));
    assert_eq!(out.unit.runnable_lines, BTreeSet::from([4, 5]));
}

#[test]
fn markers_are_push32_immediates() {
    let out = instrument("contract A { function f() public { } }");
    for (marker, _) in out.table.iter() {
        let literal = format!("0x{marker:x}");
        assert_eq!(literal.len(), 2 + 64);
        assert!(out.source.contains(&literal), "marker literal missing from source");
    }
}

#[test]
fn free_functions_get_file_scoped_helpers() {
    let out = instrument(
        "function add(uint a, uint b) pure returns (uint) { return a + b; }\ncontract A { function f() public {} }\n",
    );
    assert_eq!(out.unit.function_map[&1].name, "add");
    // File-level helpers cannot carry visibility.
    assert!(out.source.contains(") pure {}"), "{}", out.source);
    solang_parser::parse(&out.source, 0).expect("file scope helpers must parse");
}
