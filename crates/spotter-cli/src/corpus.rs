//! Corpus loading: JSON chunk files into the in-memory index provider.

use std::path::Path;

use anyhow::{Context, Result, bail};

use spotter_evidence::{Chunk, IndexName, MemoryIndexProvider};

/// Read a corpus file: a JSON array of chunks.
pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus file at {}", path.display()))?;
    let chunks: Vec<Chunk> = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse corpus file at {}", path.display()))?;
    Ok(chunks)
}

/// Build a provider hosting whichever corpora are configured. An unconfigured
/// index is simply not hosted; requests then run degraded on the other one.
pub fn build_provider(
    science: Option<&Path>,
    plans: Option<&Path>,
) -> Result<MemoryIndexProvider> {
    if science.is_none() && plans.is_none() {
        bail!(
            "no corpus configured; set corpus paths in the config file or SPOTTER_SCIENCE_CORPUS / SPOTTER_PLANS_CORPUS"
        );
    }

    let mut provider = MemoryIndexProvider::new();
    if let Some(path) = science {
        let chunks = load_chunks(path)?;
        println!("  {}: {} chunks from {}", IndexName::Science, chunks.len(), path.display());
        provider = provider.with_index(IndexName::Science, chunks);
    }
    if let Some(path) = plans {
        let chunks = load_chunks(path)?;
        println!("  {}: {} chunks from {}", IndexName::Plans, chunks.len(), path.display());
        provider = provider.with_index(IndexName::Plans, chunks);
    }
    Ok(provider)
}
