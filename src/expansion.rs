use crate::cfg::Cfg;
use crate::error::Result;
use crate::expression::Expression;
use crate::memory::{MemoryManager, Value};
use crate::models::{ImmediateOperand, Instruction, MemoryOperand, Operand, RegisterOperand};
use std::mem;

/// Name of the 4-byte slot used to preserve the scratch register while a
/// memory operand is staged through a push or pop.
pub const SCRATCH_SLOT: &str = "__scratch";

/// Rewrites `pushl`/`popl` into explicit stack arithmetic. Register and
/// immediate operands expand to two instructions; memory operands are moved
/// through a scratch register whose value is parked in [`SCRATCH_SLOT`].
pub fn expand_stack_ops(cfg: &mut Cfg, memory: &mut MemoryManager, data_label: &str) -> Result<()> {
    let scratch = memory.allocate_data(Value::Int(0), SCRATCH_SLOT, true)?;
    let scratch_offset = i64::from(memory.get(scratch).offset());

    for block in &mut cfg.blocks {
        let instructions = mem::take(&mut block.instructions);

        for instruction in instructions {
            match instruction.mnemonic.as_str() {
                "pushl" if instruction.operands.len() == 1 => {
                    expand_push(instruction, scratch_offset, data_label, &mut block.instructions);
                }
                "popl" if instruction.operands.len() == 1 => {
                    expand_pop(instruction, scratch_offset, data_label, &mut block.instructions);
                }
                _ => block.instructions.push(instruction),
            }
        }
    }

    Ok(())
}

fn expand_push(
    instruction: Instruction,
    scratch_offset: i64,
    data_label: &str,
    out: &mut Vec<Instruction>,
) {
    use RegisterOperand::ESP;

    let src = instruction.operands.into_iter().next().unwrap();

    match src {
        // push %esp stores the pre-decrement value: write it below the
        // stack top first, then move the pointer down onto it.
        Operand::Register(ESP) => {
            out.push(Instruction::synthesized(
                "movl",
                vec![
                    Operand::Register(ESP),
                    Operand::Memory(MemoryOperand::base_displacement(
                        ESP,
                        Expression::scalar(-4),
                    )),
                ],
            ));
            out.push(sub_esp());
        }
        Operand::Register(_) | Operand::Immediate(_) => {
            out.push(sub_esp());
            out.push(Instruction::synthesized("movl", vec![src, esp_slot()]));
        }
        Operand::Memory(ref memory) => {
            let scratch = scratch_register(memory);
            out.push(save_scratch(scratch, scratch_offset, data_label));
            out.push(Instruction::synthesized(
                "movl",
                vec![src, Operand::Register(scratch)],
            ));
            out.push(sub_esp());
            out.push(Instruction::synthesized(
                "movl",
                vec![Operand::Register(scratch), esp_slot()],
            ));
            out.push(restore_scratch(scratch, scratch_offset, data_label));
        }
    }
}

fn expand_pop(
    instruction: Instruction,
    scratch_offset: i64,
    data_label: &str,
    out: &mut Vec<Instruction>,
) {
    use RegisterOperand::ESP;

    let dst = instruction.operands.into_iter().next().unwrap();

    match dst {
        // pop %esp loads the new stack pointer from the stack; the usual
        // post-increment is overwritten by the load itself.
        Operand::Register(ESP) => {
            out.push(Instruction::synthesized(
                "movl",
                vec![esp_slot(), Operand::Register(ESP)],
            ));
        }
        Operand::Register(_) => {
            out.push(Instruction::synthesized("movl", vec![esp_slot(), dst]));
            out.push(add_esp());
        }
        Operand::Memory(ref memory) => {
            let scratch = scratch_register(memory);
            out.push(save_scratch(scratch, scratch_offset, data_label));
            out.push(Instruction::synthesized(
                "movl",
                vec![esp_slot(), Operand::Register(scratch)],
            ));
            out.push(add_esp());
            out.push(Instruction::synthesized(
                "movl",
                vec![Operand::Register(scratch), dst],
            ));
            out.push(restore_scratch(scratch, scratch_offset, data_label));
        }
        // Popping into an immediate is left for the assembler to reject.
        Operand::Immediate(_) => {
            out.push(Instruction::new("popl", vec![dst], instruction.line));
        }
    }
}

/// EAX, unless the operand references EAX, in which case EBX.
fn scratch_register(memory: &MemoryOperand) -> RegisterOperand {
    use RegisterOperand::{EAX, EBX};

    let references_eax = memory.base.map(|r| r.parent32() == EAX).unwrap_or(false)
        || memory.index.map(|r| r.parent32() == EAX).unwrap_or(false);

    if references_eax {
        EBX
    } else {
        EAX
    }
}

fn sub_esp() -> Instruction {
    Instruction::synthesized(
        "subl",
        vec![
            Operand::Immediate(ImmediateOperand(Expression::scalar(4))),
            Operand::Register(RegisterOperand::ESP),
        ],
    )
}

fn add_esp() -> Instruction {
    Instruction::synthesized(
        "addl",
        vec![
            Operand::Immediate(ImmediateOperand(Expression::scalar(4))),
            Operand::Register(RegisterOperand::ESP),
        ],
    )
}

fn esp_slot() -> Operand {
    Operand::Memory(MemoryOperand::with_base(RegisterOperand::ESP))
}

fn slot_operand(data_label: &str, offset: i64) -> Operand {
    Operand::Memory(MemoryOperand::with_displacement(
        Expression::symbol(data_label) + offset,
    ))
}

fn save_scratch(scratch: RegisterOperand, offset: i64, data_label: &str) -> Instruction {
    Instruction::synthesized(
        "movl",
        vec![Operand::Register(scratch), slot_operand(data_label, offset)],
    )
}

fn restore_scratch(scratch: RegisterOperand, offset: i64, data_label: &str) -> Instruction {
    Instruction::synthesized(
        "movl",
        vec![slot_operand(data_label, offset), Operand::Register(scratch)],
    )
}
