use std::path::Path;

use super::read_json;

pub fn balance(lengths: &Path, nodes: usize) -> anyhow::Result<()> {
    let sequences: Vec<Vec<u64>> = read_json(lengths)?;
    let results = seqpack_core::load_balance(&sequences, nodes)?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
