//! Control-flow flattener for 32-bit x86 assembly in AT&T/GAS syntax.
//!
//! The main function provided by this crate is [`movfuscate`](fn.movfuscate.html),
//! which accepts assembly source text containing a `.data` and a `.text`
//! section and returns an equivalent listing in which every function's
//! control flow graph has been re-linearized over a shared memory-resident
//! register context:
//!
//! * every datum is packed into one master data block and addressed as
//!   `__GLOBAL_MEM + offset`,
//! * `pushl`/`popl` are expanded into explicit `subl`/`movl`/`addl`
//!   sequences,
//! * each tracked CPU register is virtualized into a 4-byte slot of the
//!   master block, loaded before and saved after every basic block,
//! * branches are rebuilt from typed CFG edges rather than copied through.
//!
//! Operands and symbolic address arithmetic are parsed with [pest]; the
//! grammar lives in `src/asm.pest`.
//!
//! # Accepted input
//!
//! Sections are opened by `.section .data`/`.data` and
//! `.section .text`/`.text` (`.bss` closes either). Comments run from `#`
//! or `//` to the end of the line. Labels match
//! `[A-Za-z_.][A-Za-z0-9_.]*` followed by `:`.
//!
//! Data directives:
//!
//!  Directive | Meaning | Example
//! -----------|---------|--------
//! `.int`, `.long` | one or more 32-bit integers | `.int 42, 0x1F`
//! `.float` | one or more 32-bit floats | `.float 3.14`
//! `.asciz`, `.string`, `.ascii` | a null-terminated string | `.asciz "hi\n"`
//! `.zero`, `.space`, `.skip` | zero-initialized space | `.zero 64`
//!
//! Integer literals auto-detect their base from a `0x`, `0o` or `0b`
//! prefix. All other directives are ignored.
//!
//! Instructions use AT&T operand order. Operands may be registers
//! (`%eax`), immediates (`$expr`), or memory references
//! (`disp(base,index,scale)` with scale 1, 2, 4 or 8); displacements and
//! immediates may be linear expressions over labels, e.g.
//! `$(table+4)` or `vec+8(%esi)`.
//!
//! # Output
//!
//! One `.section .data` holding the master label with every allocation
//! (user data, alignment padding, the push/pop scratch slot and the eight
//! register slots), followed by one `.section .text` with a `.global`
//! line and a flattened body per input function. No user data symbol
//! survives in the text section; every reference is materialized as
//! `__GLOBAL_MEM + offset`.
//!
//! [pest]: https://docs.rs/pest/

pub mod cfg;
pub mod context;
pub mod data;
pub mod emit;
pub mod error;
pub mod expansion;
pub mod expression;
pub mod instructions;
pub mod int_util;
pub mod linearizer;
pub mod memory;
pub mod models;
pub mod parser;
pub mod symbols;

#[cfg(test)]
mod test;

pub use crate::error::{Error, Result};

/// The single master symbol naming the start of the emitted data region.
pub const DATA_LABEL: &str = "__GLOBAL_MEM";

/// Runs the whole pipeline on `source` and returns the transformed listing.
pub fn movfuscate(source: &str) -> Result<String> {
    let mut memory = memory::MemoryManager::new();

    let data_map = data::parse_data(&mut memory, source)?;
    let offsets = symbols::label_offsets(&data_map, &memory);

    let mut cfg = instructions::parse_cfg(source)?;

    symbols::resolve_symbols(&mut cfg, &offsets, DATA_LABEL);
    expansion::expand_stack_ops(&mut cfg, &mut memory, DATA_LABEL)?;
    context::inject_context_switching(&mut cfg, &mut memory, DATA_LABEL)?;

    let functions = linearizer::linearize(&cfg);

    Ok(emit::render(&memory, DATA_LABEL, &functions))
}
