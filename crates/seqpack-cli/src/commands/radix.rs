use std::path::Path;

use seqpack_core::{PrefixGroup, radix_merge, radix_sort};

use super::read_json;

pub struct RadixOptions {
    pub start_index: usize,
    pub max_index: usize,
    pub max_value: u32,
    pub merge: Option<usize>,
    pub max_length: usize,
    pub max_count: usize,
    pub cross_group: bool,
}

pub fn radix(groups: &Path, options: &RadixOptions) -> anyhow::Result<()> {
    let groups: Vec<PrefixGroup> = read_json(groups)?;
    let sorted = radix_sort(&groups, options.start_index, options.max_index, options.max_value)?;

    match options.merge {
        Some(min_prefix_match) => {
            let merged = radix_merge(
                &sorted,
                min_prefix_match,
                options.max_length,
                options.max_count,
                options.cross_group,
            )?;
            println!("{}", serde_json::to_string(&merged)?);
        }
        None => println!("{}", serde_json::to_string(&sorted)?),
    }
    Ok(())
}
