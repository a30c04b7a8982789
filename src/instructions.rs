use crate::cfg::{BasicBlock, BlockId, Cfg, Function, JumpCondition, Successor};
use crate::error::{Error, Result};
use crate::models::{Instruction, Operand};
use crate::parser;
use std::collections::{HashMap, VecDeque};

/// Parses the text section of `source` into a control flow graph: blocks
/// linked through typed successor edges and partitioned into functions.
///
/// After this returns, no conditional or unconditional jump instruction
/// remains in any block's instruction list; branch semantics live on the
/// edges. `ret`/`iret`/`syscall` stay as the last instruction of their
/// block.
pub fn parse_cfg(source: &str) -> Result<Cfg> {
    let elements = parse_elements(source)?;
    let mut blocks = build_blocks(elements);

    if blocks.is_empty() {
        return Ok(Cfg::default());
    }

    link_blocks(&mut blocks)?;
    Ok(extract_functions(blocks))
}

/// Strips `#...` and `//...` comments.
pub(crate) fn strip_comment(line: &str) -> &str {
    let line = line.split('#').next().unwrap();
    line.split("//").next().unwrap()
}

enum Element {
    Label(String),
    Instruction(Instruction),
}

fn parse_elements(source: &str) -> Result<Vec<Element>> {
    let mut elements = Vec::new();
    let mut in_text = false;

    for (index, raw_line) in source.lines().enumerate() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(".section .text") || line == ".text" {
            in_text = true;
            continue;
        }
        if line.starts_with(".section") || line == ".data" || line == ".bss" {
            in_text = false;
            continue;
        }
        if !in_text {
            continue;
        }

        if line.ends_with(':') {
            elements.push(Element::Label(line[..line.len() - 1].to_owned()));
            continue;
        }

        let (mnemonic, rest) = match line.split_once(|c: char| c.is_whitespace()) {
            Some((mnemonic, rest)) => (mnemonic, rest.trim()),
            None => (line, ""),
        };

        let mnemonic = mnemonic.to_lowercase();
        if mnemonic.starts_with('.') {
            // Assembler directives inside the text section are not parsed.
            continue;
        }

        let mut operands = Vec::new();
        if !rest.is_empty() {
            for text in split_operands(rest) {
                operands.push(parser::parse_operand(text)?);
            }
        }

        elements.push(Element::Instruction(Instruction::new(
            mnemonic,
            operands,
            index + 1,
        )));
    }

    Ok(elements)
}

/// Splits an operand list on commas, ignoring commas inside parentheses:
/// `4(%eax, %ebx), $10` -> `["4(%eax, %ebx)", "$10"]`.
fn split_operands(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    parts.push(text[start..].trim());

    parts.into_iter().filter(|part| !part.is_empty()).collect()
}

/// Groups the element stream into blocks. A label opens a new block (the
/// latest of adjacent labels becomes the current one); an instruction with
/// no open block opens an anonymous `loc_<line>` block; a terminator closes
/// the current block.
fn build_blocks(elements: Vec<Element>) -> Vec<BasicBlock> {
    let mut blocks: Vec<BasicBlock> = Vec::new();
    let mut current: Option<BlockId> = None;

    for element in elements {
        match element {
            Element::Label(name) => {
                blocks.push(BasicBlock::new(name));
                current = Some(blocks.len() - 1);
            }
            Element::Instruction(instruction) => {
                let id = match current {
                    Some(id) => id,
                    None => {
                        blocks.push(BasicBlock::new(format!("loc_{}", instruction.line)));
                        blocks.len() - 1
                    }
                };
                current = Some(id);

                let terminates = is_terminator(&instruction.mnemonic);
                blocks[id].instructions.push(instruction);
                if terminates {
                    current = None;
                }
            }
        }
    }

    blocks
}

fn link_blocks(blocks: &mut [BasicBlock]) -> Result<()> {
    let block_map: HashMap<String, BlockId> = blocks
        .iter()
        .enumerate()
        .map(|(id, block)| (block.name.clone(), id))
        .collect();

    for id in 0..blocks.len() {
        let next_physical = if id + 1 < blocks.len() {
            Some(id + 1)
        } else {
            None
        };

        let last = match blocks[id].instructions.last() {
            Some(last) => last.clone(),
            None => {
                // Empty blocks fall through to the next physical block.
                blocks[id].successor = next_physical.map(Successor::Direct);
                continue;
            }
        };

        if !is_terminator(&last.mnemonic) {
            blocks[id].successor = next_physical.map(Successor::Direct);
            continue;
        }

        // Returns keep their instruction and leave the block without a
        // successor.
        if is_return(&last.mnemonic) {
            continue;
        }

        let target = resolve_target(&last, &block_map)?;

        if is_unconditional(&last.mnemonic) {
            blocks[id].successor = Some(Successor::Direct(target));
            blocks[id].instructions.pop();
        } else {
            let next = next_physical.ok_or(Error::DanglingConditionalJump { line: last.line })?;
            let (condition, swap) = JumpCondition::from_mnemonic(&last.mnemonic).ok_or_else(|| {
                Error::UnknownConditionalJump {
                    mnemonic: last.mnemonic.clone(),
                    line: last.line,
                }
            })?;

            blocks[id].successor = Some(if swap {
                Successor::Conditional {
                    true_block: next,
                    false_block: target,
                    condition,
                }
            } else {
                Successor::Conditional {
                    true_block: target,
                    false_block: next,
                    condition,
                }
            });
            blocks[id].instructions.pop();
        }
    }

    Ok(())
}

fn resolve_target(instruction: &Instruction, block_map: &HashMap<String, BlockId>) -> Result<BlockId> {
    let operand = instruction.operands.first().ok_or(Error::MissingJumpTarget {
        line: instruction.line,
    })?;

    // A branch target parses as a memory operand whose displacement is the
    // bare label.
    let label = match operand {
        Operand::Memory(memory) => memory.displacement.to_string(),
        _ => {
            return Err(Error::MissingJumpTarget {
                line: instruction.line,
            });
        }
    };

    block_map
        .get(&label)
        .copied()
        .ok_or(Error::UnresolvedBranchTarget {
            label,
            line: instruction.line,
        })
}

/// Each connected component of the linked block list, taken in source
/// order, becomes one function named after its first block.
fn extract_functions(blocks: Vec<BasicBlock>) -> Cfg {
    let mut cfg = Cfg {
        blocks,
        functions: Vec::new(),
    };
    let mut visited = vec![false; cfg.blocks.len()];

    for id in 0..cfg.blocks.len() {
        if visited[id] {
            continue;
        }

        cfg.functions
            .push(Function::new(cfg.blocks[id].name.clone(), id));

        let mut queue: VecDeque<BlockId> = VecDeque::new();
        queue.push_back(id);

        while let Some(current) = queue.pop_front() {
            if visited[current] {
                continue;
            }
            visited[current] = true;

            match cfg.blocks[current].successor {
                Some(Successor::Direct(next)) => queue.push_back(next),
                Some(Successor::Conditional {
                    true_block,
                    false_block,
                    ..
                }) => {
                    queue.push_back(true_block);
                    queue.push_back(false_block);
                }
                None => {}
            }
        }
    }

    cfg
}

fn is_terminator(mnemonic: &str) -> bool {
    mnemonic.starts_with('j') || mnemonic.starts_with('b') || is_return(mnemonic)
}

fn is_unconditional(mnemonic: &str) -> bool {
    matches!(mnemonic, "jmp" | "b") || is_return(mnemonic)
}

fn is_return(mnemonic: &str) -> bool {
    matches!(mnemonic, "ret" | "iret" | "syscall")
}
