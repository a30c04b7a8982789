use crate::linearizer::{LinearFunction, LinearItem};
use crate::memory::MemoryManager;

/// Renders the final listing: the master data block first, then one
/// flattened function per input function.
pub fn render(memory: &MemoryManager, data_label: &str, functions: &[LinearFunction]) -> String {
    format!(
        "{}\n{}",
        render_data_section(memory, data_label),
        render_text_section(functions)
    )
}

fn render_data_section(memory: &MemoryManager, data_label: &str) -> String {
    let mut lines = vec![".section .data".to_owned(), format!("{}:", data_label)];

    for allocation in memory.allocations() {
        lines.push(format!("    {}", allocation));
    }

    lines.join("\n") + "\n"
}

fn render_text_section(functions: &[LinearFunction]) -> String {
    let mut lines = vec![".section .text".to_owned()];

    for function in functions {
        lines.push(String::new());
        lines.push(format!(".global {}", function.name));

        for item in &function.items {
            match item {
                LinearItem::Label(label) => lines.push(format!("{}:", label)),
                LinearItem::Instruction(instruction) => {
                    lines.push(format!("    {}", instruction));
                }
            }
        }
    }

    lines.join("\n") + "\n"
}
