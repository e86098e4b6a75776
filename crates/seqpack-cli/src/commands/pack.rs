use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use seqpack_core::{Length, PackConfig};

use super::read_json;

pub struct PackOptions<'a> {
    pub strategy: Option<&'a str>,
    pub verify: bool,
}

pub fn pack<L>(config: &Path, lengths: &Path, options: &PackOptions<'_>) -> anyhow::Result<()>
where
    L: Length + Serialize + DeserializeOwned,
{
    let mut config = PackConfig::<L>::from_file(config)?;
    if let Some(name) = options.strategy {
        config.strategy = Some(name.parse()?);
    }
    let lengths: Vec<L> = read_json(lengths)?;

    let algorithm = config.resolve()?;
    let result = algorithm.run(&lengths)?;
    if options.verify {
        result.verify(&lengths, &algorithm.capacity())?;
        tracing::info!(strategy = %algorithm.strategy(), bins = result.bin_count(), "packing verified");
    }

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
