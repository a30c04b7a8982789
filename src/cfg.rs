use crate::models::Instruction;

/// Index of a block inside its [`Cfg`] arena. Blocks are owned by the arena
/// and edges are plain indices, so cyclic graphs need no shared ownership.
pub type BlockId = usize;

/// One of the canonical branch conditions. Every x86 conditional jump
/// mnemonic reduces to one of these plus a flag saying whether the taken and
/// fall-through targets must be exchanged.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JumpCondition {
    JE,
    JL,
    JG,
    JB,
    JA,
}

impl JumpCondition {
    /// Maps a conditional jump mnemonic to its canonical condition and swap
    /// flag (`jne` is `JE` with swapped targets, and so on).
    pub fn from_mnemonic(mnemonic: &str) -> Option<(JumpCondition, bool)> {
        use JumpCondition::*;

        let (condition, swap) = match mnemonic {
            "je" | "jz" => (JE, false),
            "jne" | "jnz" => (JE, true),
            "jl" | "jnge" => (JL, false),
            "jge" | "jnl" => (JL, true),
            "jg" | "jnle" => (JG, false),
            "jle" | "jng" => (JG, true),
            "jb" | "jnae" | "jc" => (JB, false),
            "jae" | "jnb" | "jnc" => (JB, true),
            "ja" | "jnbe" => (JA, false),
            "jbe" | "jna" => (JA, true),
            _ => return None,
        };

        Some((condition, swap))
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            JumpCondition::JE => "je",
            JumpCondition::JL => "jl",
            JumpCondition::JG => "jg",
            JumpCondition::JB => "jb",
            JumpCondition::JA => "ja",
        }
    }

    /// The mnemonic that branches exactly when `self` does not.
    pub fn inverse_mnemonic(self) -> &'static str {
        match self {
            JumpCondition::JE => "jne",
            JumpCondition::JL => "jge",
            JumpCondition::JG => "jle",
            JumpCondition::JB => "jae",
            JumpCondition::JA => "jbe",
        }
    }
}

/// Where control goes after a block. Branch semantics live exclusively here;
/// once the CFG is linked, no jump instruction remains in any instruction
/// list.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Successor {
    /// Unconditional fall-through or `jmp`.
    Direct(BlockId),
    /// Two-way branch on a canonical condition.
    Conditional {
        true_block: BlockId,
        false_block: BlockId,
        condition: JumpCondition,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    pub name: String,
    pub instructions: Vec<Instruction>,
    /// `None` when the block terminates (`ret`/`iret`/`syscall` or a
    /// dangling end of section).
    pub successor: Option<Successor>,
}

impl BasicBlock {
    pub fn new<S: Into<String>>(name: S) -> BasicBlock {
        BasicBlock {
            name: name.into(),
            instructions: Vec::new(),
            successor: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub entry: BlockId,
    /// Instructions executed once on function entry, before the entry block.
    /// Populated by the context switching pass.
    pub prologue: Vec<Instruction>,
}

impl Function {
    pub fn new<S: Into<String>>(name: S, entry: BlockId) -> Function {
        Function {
            name: name.into(),
            entry,
            prologue: Vec::new(),
        }
    }
}

/// The parsed text section: one block arena plus the functions partitioning
/// it. Every block belongs to exactly one function's component.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub functions: Vec<Function>,
}

impl Cfg {
    /// All blocks reachable from `entry`, in depth-first pre-order with the
    /// taken branch explored before the fall-through. This is the emission
    /// order of the linearizer, so it must stay deterministic.
    pub fn reachable_blocks(&self, entry: BlockId) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut stack = vec![entry];

        while let Some(id) = stack.pop() {
            if visited[id] {
                continue;
            }
            visited[id] = true;
            order.push(id);

            match self.blocks[id].successor {
                Some(Successor::Direct(next)) => stack.push(next),
                Some(Successor::Conditional {
                    true_block,
                    false_block,
                    ..
                }) => {
                    // Pushed false-first so the taken branch pops first.
                    stack.push(false_block);
                    stack.push(true_block);
                }
                None => {}
            }
        }

        order
    }
}
