use crate::expression::Expression;
use num_derive::ToPrimitive;
use num_traits::ToPrimitive;
use std::fmt;
use util::{AttName, EnumFromStr};
use util_derive::{AttName, EnumFromStr};

/// The x86 general purpose register file visible to the transformer.
///
/// Declaration order is the ordinal order used wherever registers are sorted;
/// the eight 32-bit registers come first so the tracked set is a prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, ToPrimitive, AttName, EnumFromStr)]
pub enum RegisterOperand {
    // 32-bit
    EAX,
    EBX,
    ECX,
    EDX,
    ESI,
    EDI,
    EBP,
    ESP,
    // 16-bit
    AX,
    BX,
    CX,
    DX,
    // 8-bit low
    AL,
    BL,
    CL,
    DL,
    // 8-bit high
    AH,
    BH,
    CH,
    DH,
}

impl RegisterOperand {
    /// Position in the declaration order.
    pub fn ordinal(self) -> u32 {
        self.to_u32().unwrap()
    }

    /// Folds a partial register onto its 32-bit container
    /// (`AL`, `AH`, `AX` -> `EAX`). 32-bit registers map to themselves.
    pub fn parent32(self) -> RegisterOperand {
        use RegisterOperand::*;

        match self {
            AX | AL | AH => EAX,
            BX | BL | BH => EBX,
            CX | CL | CH => ECX,
            DX | DL | DH => EDX,
            other => other,
        }
    }
}

impl fmt::Display for RegisterOperand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.att_name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImmediateOperand(pub Expression);

impl fmt::Display for ImmediateOperand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // AT&T syntax prefixes immediates with '$'; the expression is
        // always parenthesized.
        write!(f, "$({})", self.0)
    }
}

/// An AT&T memory reference: `displacement(base,index,scale)`.
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryOperand {
    pub base: Option<RegisterOperand>,
    pub index: Option<RegisterOperand>,
    pub scale: u32,
    pub displacement: Expression,
}

impl MemoryOperand {
    pub fn new(
        base: Option<RegisterOperand>,
        index: Option<RegisterOperand>,
        scale: u32,
        displacement: Expression,
    ) -> MemoryOperand {
        MemoryOperand {
            base,
            index,
            scale,
            displacement,
        }
    }

    pub fn with_displacement(displacement: Expression) -> MemoryOperand {
        MemoryOperand::new(None, None, 1, displacement)
    }

    pub fn with_base(base: RegisterOperand) -> MemoryOperand {
        MemoryOperand::new(Some(base), None, 1, Expression::scalar(0))
    }

    pub fn base_displacement(base: RegisterOperand, displacement: Expression) -> MemoryOperand {
        MemoryOperand::new(Some(base), None, 1, displacement)
    }
}

impl fmt::Display for MemoryOperand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let has_register = self.base.is_some() || self.index.is_some();

        // A zero displacement is left implicit when a register part follows.
        if !(self.displacement.is_zero() && has_register) {
            write!(f, "{}", self.displacement)?;
        }

        if has_register {
            write!(f, "(")?;
            if let Some(base) = self.base {
                write!(f, "{}", base)?;
            }
            if let Some(index) = self.index {
                write!(f, ",{}", index)?;
                if self.scale != 1 {
                    write!(f, ",{}", self.scale)?;
                }
            }
            write!(f, ")")?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Register(RegisterOperand),
    Immediate(ImmediateOperand),
    Memory(MemoryOperand),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Register(register) => write!(f, "{}", register),
            Operand::Immediate(immediate) => write!(f, "{}", immediate),
            Operand::Memory(memory) => write!(f, "{}", memory),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    /// Lowercased mnemonic.
    pub mnemonic: String,
    pub operands: Vec<Operand>,
    /// 1-based source line, 0 for synthesized instructions.
    pub line: usize,
}

impl Instruction {
    pub fn new<S: Into<String>>(mnemonic: S, operands: Vec<Operand>, line: usize) -> Instruction {
        Instruction {
            mnemonic: mnemonic.into(),
            operands,
            line,
        }
    }

    pub fn synthesized<S: Into<String>>(mnemonic: S, operands: Vec<Operand>) -> Instruction {
        Instruction::new(mnemonic, operands, 0)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " {}", operand)?;
            } else {
                write!(f, ", {}", operand)?;
            }
        }
        Ok(())
    }
}
