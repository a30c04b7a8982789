use crate::cfg::Cfg;
use crate::data::DataMap;
use crate::expression::Expression;
use crate::memory::MemoryManager;
use crate::models::Operand;
use std::collections::HashMap;

/// The canonical offset of each data label: the offset of the *first*
/// allocation recorded under it. Later allocations under the same label are
/// reachable only through user-written arithmetic on the label.
pub fn label_offsets(data_map: &DataMap, memory: &MemoryManager) -> HashMap<String, i64> {
    data_map
        .iter()
        .filter_map(|(name, allocations)| {
            allocations
                .first()
                .map(|&id| (name.clone(), i64::from(memory.get(id).offset())))
        })
        .collect()
}

/// Rewrites every Immediate and Memory operand in the CFG, substituting each
/// data symbol `s` with `(data_label + offset(s))`. Registers and unknown
/// symbols are left alone.
pub fn resolve_symbols(cfg: &mut Cfg, offsets: &HashMap<String, i64>, data_label: &str) {
    for block in &mut cfg.blocks {
        for instruction in &mut block.instructions {
            for operand in &mut instruction.operands {
                let expression = match operand {
                    Operand::Immediate(immediate) => &mut immediate.0,
                    Operand::Memory(memory) => &mut memory.displacement,
                    Operand::Register(_) => continue,
                };
                resolve_expression(expression, offsets, data_label);
            }
        }
    }
}

fn resolve_expression(
    expression: &mut Expression,
    offsets: &HashMap<String, i64>,
    data_label: &str,
) {
    let targets: Vec<String> = expression
        .symbols()
        .into_iter()
        .filter(|symbol| offsets.contains_key(*symbol))
        .map(str::to_owned)
        .collect();

    for symbol in targets {
        let replacement = Expression::symbol(data_label) + offsets[&symbol];
        expression.substitute(&symbol, replacement);
    }
}
