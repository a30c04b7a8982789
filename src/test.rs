use crate::cfg::{BasicBlock, BlockId, Cfg, JumpCondition, Successor};
use crate::instructions::parse_cfg;
use crate::models::Operand;
use crate::movfuscate;
use crate::parser::{parse_expression, parse_operand};

fn block_id(cfg: &Cfg, name: &str) -> BlockId {
    cfg.blocks
        .iter()
        .position(|block| block.name == name)
        .unwrap_or_else(|| panic!("no block named {}", name))
}

fn block<'c>(cfg: &'c Cfg, name: &str) -> &'c BasicBlock {
    &cfg.blocks[block_id(cfg, name)]
}

// --- Expression parsing ---

#[test]
fn parse_scalars_and_symbols() {
    assert_eq!(parse_expression("0").unwrap().to_string(), "0");
    assert_eq!(parse_expression("42").unwrap().to_string(), "42");
    assert_eq!(parse_expression("-10").unwrap().to_string(), "-10");
    assert_eq!(parse_expression("+5").unwrap().to_string(), "5");

    assert_eq!(parse_expression("x").unwrap().to_string(), "x");
    assert_eq!(parse_expression("my_var").unwrap().to_string(), "my_var");
    assert_eq!(parse_expression(".L1").unwrap().to_string(), ".L1");
}

#[test]
fn parse_arithmetic() {
    assert_eq!(parse_expression("10 + 20").unwrap().to_string(), "30");
    assert_eq!(parse_expression("A + 5").unwrap().to_string(), "A+5");
    assert_eq!(parse_expression("10 - A").unwrap().to_string(), "-A+10");
    assert_eq!(parse_expression("3 * x").unwrap().to_string(), "3*x");
    assert_eq!(parse_expression("x * 3").unwrap().to_string(), "3*x");
}

#[test]
fn parse_precedence_and_parentheses() {
    assert_eq!(parse_expression("1 + 2 * 3").unwrap().to_string(), "7");
    assert_eq!(parse_expression("(1 + 2) * 3").unwrap().to_string(), "9");
    assert_eq!(parse_expression("2 * (A + 5)").unwrap().to_string(), "2*A+10");
    assert_eq!(
        parse_expression("((1 + 2) * 3) + 4").unwrap().to_string(),
        "13"
    );
    // Left associativity: (10 - 2) - 3, not 10 - (2 - 3).
    assert_eq!(parse_expression("10 - 2 - 3").unwrap().to_string(), "5");
}

#[test]
fn parse_unary_operators() {
    assert_eq!(parse_expression("-A").unwrap().to_string(), "-A");
    assert_eq!(parse_expression("-(A + 1)").unwrap().to_string(), "-A-1");
    assert_eq!(parse_expression("+A").unwrap().to_string(), "A");
    assert_eq!(parse_expression("-(-5)").unwrap().to_string(), "5");
}

#[test]
fn parse_complex_algebra() {
    assert_eq!(
        parse_expression("4 + A + 8 - A + B").unwrap().to_string(),
        "B+12"
    );
    assert_eq!(
        parse_expression("2 * (A - 1) + 3 * A").unwrap().to_string(),
        "5*A-2"
    );
}

#[test]
fn parse_whitespace_and_empty_input() {
    assert_eq!(parse_expression("  A   +   B  ").unwrap().to_string(), "A+B");
    assert_eq!(parse_expression("\t1\n+\t2").unwrap().to_string(), "3");
    assert_eq!(parse_expression("").unwrap().to_string(), "0");
    assert_eq!(parse_expression("   ").unwrap().to_string(), "0");
}

#[test]
fn parse_round_trips_over_the_canonical_form() {
    for text in &["B+4", "5*A-2", "-A+10", "2*Y+Z+10", "0", "-7", "a+b+c"] {
        let parsed = parse_expression(text).unwrap();
        let reparsed = parse_expression(&parsed.to_string()).unwrap();
        assert_eq!(parsed, reparsed);
        assert_eq!(parsed.to_string(), *text);
    }
}

#[test]
fn parse_rejects_non_linear_products() {
    let err = parse_expression("A * B").unwrap_err();
    assert!(err.to_string().contains("Non-linear"), "{}", err);
    assert!(parse_expression("2 * A * B").is_err());
}

#[test]
fn parse_rejects_malformed_input() {
    // Trailing tokens after a complete expression.
    assert!(parse_expression("A % 2").is_err());
    assert!(parse_expression("A + 1)").is_err());
    // Unbalanced parentheses.
    assert!(parse_expression("(A + 1").is_err());
    // Trailing operator.
    assert!(parse_expression("10 +").is_err());
}

// --- Operand parsing ---

#[test]
fn operand_registers() {
    assert_eq!(parse_operand("%eax").unwrap().to_string(), "%eax");
    // Register names are case-insensitive.
    assert_eq!(parse_operand("%EAX").unwrap().to_string(), "%eax");
    assert_eq!(parse_operand("%ah").unwrap().to_string(), "%ah");
    assert!(parse_operand("%xyz").is_err());
}

#[test]
fn operand_immediates() {
    assert_eq!(parse_operand("$42").unwrap().to_string(), "$(42)");
    assert_eq!(parse_operand("$-4").unwrap().to_string(), "$(-4)");
    assert_eq!(
        parse_operand("$(table+4)").unwrap().to_string(),
        "$(table+4)"
    );
}

#[test]
fn operand_memory_forms() {
    assert_eq!(parse_operand("8(%ebp)").unwrap().to_string(), "8(%ebp)");
    assert_eq!(parse_operand("-4(%esp)").unwrap().to_string(), "-4(%esp)");
    assert_eq!(parse_operand("(%eax)").unwrap().to_string(), "(%eax)");
    assert_eq!(
        parse_operand("(%eax, %esi, 4)").unwrap().to_string(),
        "(%eax,%esi,4)"
    );
    assert_eq!(parse_operand("(,%ebx,8)").unwrap().to_string(), "(,%ebx,8)");
    assert_eq!(
        parse_operand("vec+8(%esi)").unwrap().to_string(),
        "vec+8(%esi)"
    );
    // A bare label is a displacement-only memory operand.
    let operand = parse_operand("loop_top").unwrap();
    match &operand {
        Operand::Memory(memory) => {
            assert!(memory.base.is_none());
            assert_eq!(memory.displacement.to_string(), "loop_top");
        }
        other => panic!("expected memory operand, got {}", other),
    }
}

#[test]
fn operand_rejects_bad_scales_and_garbage() {
    assert!(parse_operand("(%eax,%ebx,3)").is_err());
    assert!(parse_operand("(%eax,%ebx,16)").is_err());
    assert!(parse_operand("(%foo)").is_err());
    assert!(parse_operand("@x").is_err());
}

// --- Text parsing and CFG construction ---

const MERGE_ARRAYS_ASM: &str = "
.text
.global merge_arrays
merge_arrays:
    pushl %ebp
    pushl %esi
    pushl %edi
    MOVL  %esp, %ebp

    XORL %esi,   %esi # src1Counter
    xorl %edi, %edi // src2Counter
    xorl %edx, %edx

loop:
    cmpl 16(%ebp), %esi
    jge  pick2

    cmpl 20(%ebp), %edi
    jge  pick1

    movl 12(%ebp), %eax // another comment
    movl (%eax, %esi, 4), %ecx # random comment

    movl 24(%ebp), %eax
    cmpl (%eax, %edi, 4), %ecx

    jge pick2

pick1:
    cmpl 16(%ebp), %esi
    jge  return

    movl 12(%ebp), %eax
    movl (%eax, %esi, 4), %ecx

    movl 28(%ebp), %eax
    movl %ecx, (%eax, %edx, 4)

    incl %esi
    incl %edx
    jmp  loop

pick2:
    cmpl 20(%ebp), %edi
    jge  return

    movl 24(%ebp), %eax
    movl (%eax, %edi, 4), %ecx

    movl 28(%ebp), %eax
    movl %ecx, (%eax, %edx, 4)

    incl %edi
    incl %edx
    jmp  loop

return:
    movl %ebp, %esp
    popl %edi
    popl %esi
    popl %ebp
    ret
";

const MULTI_FUNC_ASM: &str = "
.text
.global main

main:
    movl $10, %eax
    call helper_func

    xorl %ecx, %ecx
lp:
    pushl %ecx
    incl %ecx
    cmpl %eax, %ecx
    jb lp

    addl $40, %esp

    xorl %eax, %eax
    ret

helper_func:
    cmpl $5, %eax
    jge  big_num

    addl $5, %eax
    ret

big_num:
big_num1:
    subl $1, %eax
    ret
";

fn all_instructions(cfg: &Cfg) -> Vec<&crate::models::Instruction> {
    cfg.blocks
        .iter()
        .flat_map(|block| block.instructions.iter())
        .collect()
}

#[test]
fn no_jump_mnemonics_survive_in_blocks() {
    for source in &[MERGE_ARRAYS_ASM, MULTI_FUNC_ASM] {
        let cfg = parse_cfg(source).unwrap();
        let instructions = all_instructions(&cfg);
        assert!(!instructions.is_empty());

        for instruction in instructions {
            assert!(
                !instruction.mnemonic.starts_with('j'),
                "jump '{}' left in a block",
                instruction.mnemonic
            );
        }
    }
}

#[test]
fn terminators_in_blocks_are_returns_only() {
    let cfg = parse_cfg(MERGE_ARRAYS_ASM).unwrap();
    for block in &cfg.blocks {
        for (i, instruction) in block.instructions.iter().enumerate() {
            let is_last = i + 1 == block.instructions.len();
            if matches!(instruction.mnemonic.as_str(), "ret" | "iret" | "syscall") {
                assert!(is_last);
                assert_eq!(block.successor, None);
            }
        }
    }
}

#[test]
fn mnemonics_are_lowercased() {
    let cfg = parse_cfg(MERGE_ARRAYS_ASM).unwrap();
    let mnemonics: Vec<&str> = all_instructions(&cfg)
        .iter()
        .map(|i| i.mnemonic.as_str())
        .collect();

    assert!(mnemonics.iter().all(|m| *m == m.to_lowercase()));
    assert!(mnemonics.contains(&"movl"));
    assert!(mnemonics.contains(&"xorl"));
}

#[test]
fn inverted_conditional_swaps_its_targets() {
    // jge is canonical JL with swapped targets: taken falls through to the
    // next physical block, not-taken goes to the label.
    let source = "
.text
start:
    cmpl %ebx, %eax
    jge bigger
    incl %eax
bigger:
    ret
";
    let cfg = parse_cfg(source).unwrap();

    let start = block(&cfg, "start");
    assert_eq!(
        start.successor,
        Some(Successor::Conditional {
            true_block: block_id(&cfg, "loc_6"),
            false_block: block_id(&cfg, "bigger"),
            condition: JumpCondition::JL,
        })
    );
    assert_eq!(start.instructions.len(), 1);
    assert_eq!(start.instructions[0].mnemonic, "cmpl");
}

#[test]
fn non_inverted_conditional_keeps_its_targets() {
    let source = "
.text
top:
    cmpl %ebx, %eax
    jb top
    ret
";
    let cfg = parse_cfg(source).unwrap();
    let top = block(&cfg, "top");
    assert_eq!(
        top.successor,
        Some(Successor::Conditional {
            true_block: block_id(&cfg, "top"),
            false_block: block_id(&cfg, "loc_6"),
            condition: JumpCondition::JB,
        })
    );
}

#[test]
fn functions_are_connected_components_in_source_order() {
    let cfg = parse_cfg(MULTI_FUNC_ASM).unwrap();

    let names: Vec<&str> = cfg
        .functions
        .iter()
        .map(|function| function.name.as_str())
        .collect();
    assert_eq!(names, vec!["main", "helper_func"]);

    // call is not a terminator, so it stays inside the entry block.
    let main = block(&cfg, "main");
    assert!(main
        .instructions
        .iter()
        .any(|instruction| instruction.mnemonic == "call"));

    // Adjacent labels become distinct blocks; the first falls through.
    assert_eq!(
        block(&cfg, "big_num").successor,
        Some(Successor::Direct(block_id(&cfg, "big_num1")))
    );
    assert!(block(&cfg, "big_num").instructions.is_empty());
}

#[test]
fn unconditional_jumps_become_direct_edges() {
    let cfg = parse_cfg(MERGE_ARRAYS_ASM).unwrap();

    // pick1 ends with `jmp loop`; the jump is removed and the edge points
    // at the loop head.
    let tail = cfg
        .blocks
        .iter()
        .find(|b| {
            b.successor == Some(Successor::Direct(block_id(&cfg, "loop")))
                && b.instructions.last().map(|i| i.mnemonic.as_str()) == Some("incl")
        })
        .expect("no block with a direct edge back to loop");
    assert!(tail.instructions.iter().all(|i| i.mnemonic != "jmp"));
}

#[test]
fn branch_to_unknown_label_fails() {
    let source = ".text\nstart:\n    jmp nowhere\n";
    match parse_cfg(source) {
        Err(crate::Error::UnresolvedBranchTarget { label, line }) => {
            assert_eq!(label, "nowhere");
            assert_eq!(line, 3);
        }
        other => panic!("expected UnresolvedBranchTarget, got {:?}", other),
    }
}

#[test]
fn unknown_conditional_jump_fails() {
    let source = ".text\nstart:\n    cmpl %eax, %ebx\n    jxyz after\nafter:\n    ret\n";
    match parse_cfg(source) {
        Err(crate::Error::UnknownConditionalJump { mnemonic, .. }) => {
            assert_eq!(mnemonic, "jxyz");
        }
        other => panic!("expected UnknownConditionalJump, got {:?}", other),
    }
}

// --- End to end ---

const E2E_INPUT: &str = "\
.section .data
counter: .int 1337
flag:    .asciz \"A\"
next_val: .int 99

.section .text
.global main
.global helper

main:
    movl counter, %eax
    cmpl next_val, %eax
    jge done
    incl %eax
    movl %eax, counter
done:
    ret

helper:
    pushl %ebp
    movl %esp, %ebp
    xorl %ecx, %ecx
lp:
    addl counter, %ecx
    incl %ecx
    cmpl $8, %ecx
    jb lp
    popl %ebp
    ret
";

const E2E_EXPECTED: &str = "\
.section .data
__GLOBAL_MEM:
    .int 1337 # counter (+0)
    .asciz \"A\" # flag (+4)
    .zero 2 # __pad_6 (+6)
    .int 99 # next_val (+8)
    .int 0 # __scratch (+12)
    .int 0 # EAX (+16)
    .int 0 # EBX (+20)
    .int 0 # ECX (+24)
    .int 0 # EDX (+28)
    .int 0 # ESI (+32)
    .int 0 # EDI (+36)
    .int 0 # EBP (+40)
    .int 0 # ESP (+44)

.section .text

.global main
main:
    movl %eax, __GLOBAL_MEM+16
    movl %ebx, __GLOBAL_MEM+20
    movl %ecx, __GLOBAL_MEM+24
    movl %edx, __GLOBAL_MEM+28
    movl %esi, __GLOBAL_MEM+32
    movl %edi, __GLOBAL_MEM+36
    movl %ebp, __GLOBAL_MEM+40
    movl %esp, __GLOBAL_MEM+44
main__entry_block:
    movl __GLOBAL_MEM+16, %eax
    movl __GLOBAL_MEM, %eax
    cmpl __GLOBAL_MEM+8, %eax
    movl %eax, __GLOBAL_MEM+16
    jge done
loc_14:
    movl __GLOBAL_MEM+16, %eax
    incl %eax
    movl %eax, __GLOBAL_MEM
    movl %eax, __GLOBAL_MEM+16
done:
    ret

.global helper
helper:
    movl %eax, __GLOBAL_MEM+16
    movl %ebx, __GLOBAL_MEM+20
    movl %ecx, __GLOBAL_MEM+24
    movl %edx, __GLOBAL_MEM+28
    movl %esi, __GLOBAL_MEM+32
    movl %edi, __GLOBAL_MEM+36
    movl %ebp, __GLOBAL_MEM+40
    movl %esp, __GLOBAL_MEM+44
helper__entry_block:
    movl __GLOBAL_MEM+24, %ecx
    movl __GLOBAL_MEM+40, %ebp
    movl __GLOBAL_MEM+44, %esp
    subl $(4), %esp
    movl %ebp, (%esp)
    movl %esp, %ebp
    xorl %ecx, %ecx
    movl %ecx, __GLOBAL_MEM+24
    movl %ebp, __GLOBAL_MEM+40
    movl %esp, __GLOBAL_MEM+44
lp:
    movl __GLOBAL_MEM+24, %ecx
    addl __GLOBAL_MEM, %ecx
    incl %ecx
    cmpl $(8), %ecx
    movl %ecx, __GLOBAL_MEM+24
    jb lp
loc_28:
    movl __GLOBAL_MEM+40, %ebp
    movl __GLOBAL_MEM+44, %esp
    movl (%esp), %ebp
    addl $(4), %esp
    ret
    movl %ebp, __GLOBAL_MEM+40
    movl %esp, __GLOBAL_MEM+44
";

#[test]
fn end_to_end_snapshot() {
    let output = movfuscate(E2E_INPUT).unwrap();
    assert_eq!(output, E2E_EXPECTED);
}

#[test]
fn end_to_end_is_deterministic() {
    assert_eq!(movfuscate(E2E_INPUT).unwrap(), movfuscate(E2E_INPUT).unwrap());
}

#[test]
fn no_data_symbol_survives_in_the_text_section() {
    let output = movfuscate(E2E_INPUT).unwrap();
    let text_section = output.split(".section .text").nth(1).unwrap();

    for symbol in &["counter", "flag", "next_val"] {
        assert!(
            !text_section.contains(symbol),
            "data symbol {} leaked into the text section",
            symbol
        );
    }
    assert!(text_section.contains("__GLOBAL_MEM"));
}

#[test]
fn no_jmp_targets_the_physically_next_label() {
    let output = movfuscate(E2E_INPUT).unwrap();
    let lines: Vec<&str> = output.lines().collect();

    for window in lines.windows(2) {
        let current = window[0].trim();
        let next = window[1].trim();
        if let Some(target) = current.strip_prefix("jmp ") {
            assert_ne!(format!("{}:", target), next);
        }
    }
}
