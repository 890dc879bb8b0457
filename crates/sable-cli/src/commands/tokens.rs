//! `sable tokens`

use anyhow::Result;
use sable_compiler::{Postfix, native_call_name, to_postfix, tokenize};

pub fn run(expr: &str) -> Result<()> {
    if let Some(name) = native_call_name(expr) {
        println!("native call: {name}");
        return Ok(());
    }

    let tokens = tokenize(expr)?;
    let listed: Vec<String> = tokens.iter().map(|t| format!("{t}@{}", t.column)).collect();
    println!("tokens:  {}", listed.join(" "));

    let postfix: Vec<String> = to_postfix(&tokens)?
        .iter()
        .map(|step| match step {
            Postfix::Push(value) => value.to_string(),
            Postfix::Apply { op, .. } => op.symbol().to_string(),
        })
        .collect();
    println!("postfix: {}", postfix.join(" "));
    Ok(())
}
