pub mod apply;
pub mod destroy;
pub mod plan;
pub mod query;

use colored::Colorize;
use std::io::Write;

/// Terminal yes/no prompt, defaulting to no
pub fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", question.yellow());
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
