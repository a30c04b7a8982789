use crate::cfg::{BasicBlock, Cfg};
use crate::error::Result;
use crate::expression::Expression;
use crate::memory::{MemoryManager, Value};
use crate::models::{Instruction, MemoryOperand, Operand, RegisterOperand};
use std::collections::{HashMap, HashSet};

/// The registers virtualized into the data block, in slot order.
pub const TRACKED_REGISTERS: [RegisterOperand; 8] = [
    RegisterOperand::EAX,
    RegisterOperand::EBX,
    RegisterOperand::ECX,
    RegisterOperand::EDX,
    RegisterOperand::ESI,
    RegisterOperand::EDI,
    RegisterOperand::EBP,
    RegisterOperand::ESP,
];

/// Virtualizes the register file: one 4-byte slot per tracked register, a
/// function-entry prologue committing the hardware state, and a
/// load/execute/save discipline wrapped around every block.
pub fn inject_context_switching(
    cfg: &mut Cfg,
    memory: &mut MemoryManager,
    data_label: &str,
) -> Result<()> {
    let offsets = allocate_register_slots(memory)?;

    for function in &mut cfg.functions {
        function.prologue = TRACKED_REGISTERS
            .iter()
            .map(|&register| save_instruction(register, offsets[&register], data_label))
            .collect();

        // The function's externally visible label stays on the function;
        // its first dispatch target gets a name of its own.
        cfg.blocks[function.entry].name = format!("{}__entry_block", function.name);
    }

    for block in &mut cfg.blocks {
        instrument_block(block, &offsets, data_label);
    }

    Ok(())
}

fn allocate_register_slots(memory: &mut MemoryManager) -> Result<HashMap<RegisterOperand, u32>> {
    let mut offsets = HashMap::new();
    for &register in TRACKED_REGISTERS.iter() {
        let id = memory.allocate_data(Value::Int(0), &format!("{:?}", register), true)?;
        offsets.insert(register, memory.get(id).offset());
    }
    Ok(offsets)
}

fn instrument_block(
    block: &mut BasicBlock,
    offsets: &HashMap<RegisterOperand, u32>,
    data_label: &str,
) {
    let used = used_registers(&block.instructions);
    if used.is_empty() {
        return;
    }

    let mut instructions = Vec::with_capacity(block.instructions.len() + used.len() * 2);
    instructions.extend(
        used.iter()
            .map(|&register| load_instruction(register, offsets[&register], data_label)),
    );
    instructions.append(&mut block.instructions);
    instructions.extend(
        used.iter()
            .map(|&register| save_instruction(register, offsets[&register], data_label)),
    );

    block.instructions = instructions;
}

/// The tracked 32-bit registers a block touches: operand registers and
/// memory base/index registers (partials folded to their parents) plus the
/// implicit uses of the arithmetic mnemonics, sorted by ordinal.
fn used_registers(instructions: &[Instruction]) -> Vec<RegisterOperand> {
    let mut used: HashSet<RegisterOperand> = HashSet::new();

    for instruction in instructions {
        for operand in &instruction.operands {
            match operand {
                Operand::Register(register) => {
                    used.insert(register.parent32());
                }
                Operand::Memory(memory) => {
                    if let Some(base) = memory.base {
                        used.insert(base.parent32());
                    }
                    if let Some(index) = memory.index {
                        used.insert(index.parent32());
                    }
                }
                Operand::Immediate(_) => {}
            }
        }

        used.extend(implicit_registers(instruction));
    }

    let mut used: Vec<RegisterOperand> = used
        .into_iter()
        .filter(|register| TRACKED_REGISTERS.contains(register))
        .collect();
    used.sort_by_key(|register| register.ordinal());
    used
}

fn implicit_registers(instruction: &Instruction) -> Vec<RegisterOperand> {
    use RegisterOperand::{EAX, EDX};

    let mnemonic = instruction.mnemonic.as_str();

    // cbw/cwde widen within EAX only. Checked before the prefix table so
    // that `cwde` is not swallowed by the `cwd` prefix.
    for prefix in &["cbw", "cwde"] {
        if mnemonic.starts_with(prefix) {
            return vec![EAX];
        }
    }

    // mul/div/idiv/cdq/cwd use EDX:EAX; the prefix match covers the size
    // suffixes (mull, divw, ...).
    for prefix in &["mul", "div", "idiv", "cdq", "cwd"] {
        if mnemonic.starts_with(prefix) {
            return vec![EAX, EDX];
        }
    }

    // Only the one-operand form of imul implicitly widens into EDX:EAX.
    if mnemonic.starts_with("imul") && instruction.operands.len() == 1 {
        return vec![EAX, EDX];
    }

    Vec::new()
}

fn slot_operand(data_label: &str, offset: u32) -> Operand {
    Operand::Memory(MemoryOperand::with_displacement(
        Expression::symbol(data_label) + i64::from(offset),
    ))
}

fn load_instruction(register: RegisterOperand, offset: u32, data_label: &str) -> Instruction {
    Instruction::synthesized(
        "movl",
        vec![slot_operand(data_label, offset), Operand::Register(register)],
    )
}

fn save_instruction(register: RegisterOperand, offset: u32, data_label: &str) -> Instruction {
    Instruction::synthesized(
        "movl",
        vec![Operand::Register(register), slot_operand(data_label, offset)],
    )
}
