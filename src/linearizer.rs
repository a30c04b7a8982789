use crate::cfg::{BasicBlock, Cfg, Function, Successor};
use crate::expression::Expression;
use crate::models::{Instruction, MemoryOperand, Operand};

/// One element of a flattened function body.
#[derive(Clone, Debug, PartialEq)]
pub enum LinearItem {
    Label(String),
    Instruction(Instruction),
}

/// A function re-linearized from its CFG: the function label, the prologue,
/// then every reachable block with its branches materialized again.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearFunction {
    pub name: String,
    pub items: Vec<LinearItem>,
}

pub fn linearize(cfg: &Cfg) -> Vec<LinearFunction> {
    cfg.functions
        .iter()
        .map(|function| linearize_function(cfg, function))
        .collect()
}

fn linearize_function(cfg: &Cfg, function: &Function) -> LinearFunction {
    let order = cfg.reachable_blocks(function.entry);

    let mut items = vec![LinearItem::Label(function.name.clone())];
    items.extend(
        function
            .prologue
            .iter()
            .cloned()
            .map(LinearItem::Instruction),
    );

    for (position, &id) in order.iter().enumerate() {
        let block = &cfg.blocks[id];
        let physical_next = order.get(position + 1).copied();

        items.push(LinearItem::Label(block.name.clone()));
        items.extend(
            block
                .instructions
                .iter()
                .cloned()
                .map(LinearItem::Instruction),
        );

        match block.successor {
            Some(Successor::Conditional {
                true_block,
                false_block,
                condition,
            }) => {
                if physical_next == Some(true_block) {
                    // The taken target is next in the emission order:
                    // branch the other way around and fall through to it.
                    items.push(jump(
                        condition.inverse_mnemonic(),
                        &cfg.blocks[false_block].name,
                    ));
                } else {
                    items.push(jump(condition.mnemonic(), &cfg.blocks[true_block].name));
                    if physical_next != Some(false_block) && !ends_unconditionally(block) {
                        items.push(jump("jmp", &cfg.blocks[false_block].name));
                    }
                }
            }
            Some(Successor::Direct(next)) => {
                if physical_next != Some(next) && !ends_unconditionally(block) {
                    items.push(jump("jmp", &cfg.blocks[next].name));
                }
            }
            None => {}
        }
    }

    LinearFunction {
        name: function.name.clone(),
        items,
    }
}

fn jump(mnemonic: &str, target: &str) -> LinearItem {
    LinearItem::Instruction(Instruction::synthesized(
        mnemonic,
        vec![Operand::Memory(MemoryOperand::with_displacement(
            Expression::symbol(target),
        ))],
    ))
}

fn ends_unconditionally(block: &BasicBlock) -> bool {
    match block.instructions.last() {
        Some(last) => matches!(last.mnemonic.as_str(), "jmp" | "ret" | "iret" | "syscall"),
        None => false,
    }
}
