//! Doctor command - check environment

use crate::exec::is_tool_installed;
use anyhow::Result;
use console::style;

pub fn run() -> Result<()> {
    println!("ecbscan doctor\n");

    // The grammar is compiled in; failure here means a broken build
    match crate::classifier::callsites::parse_fragment("x = 1\n") {
        Ok(_) => println!("{} tree-sitter Python grammar: OK", style("✓").green()),
        Err(e) => println!("{} tree-sitter Python grammar: {}", style("✗").red(), e),
    }

    if is_tool_installed("python3") {
        println!(
            "{} python3: found (block-repetition probe available)",
            style("✓").green()
        );
    } else {
        println!(
            "{} python3: not found (verification falls back to static strategy)",
            style("○").yellow()
        );
    }

    if is_tool_installed("bandit") {
        println!("{} bandit: found (external findings merged)", style("✓").green());
    } else {
        println!(
            "{} bandit: not found (external section will be empty)",
            style("○").yellow()
        );
    }

    Ok(())
}
