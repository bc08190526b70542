//! `vdm resolve` – show what a reference expands to, without downloading.

use anyhow::Result;
use vdm_core::resolver::{ItemResolver, Reference, YtDlpResolver};

pub async fn run_resolve(reference: &str, max_items: Option<usize>) -> Result<()> {
    let reference = Reference::parse(reference)?;
    let resolver = YtDlpResolver::new("yt-dlp", max_items);
    let items = resolver.resolve(&reference).await?;

    println!("{:<4} {:<13} {}", "#", "ID", "TITLE");
    for (index, item) in items.iter().enumerate() {
        println!(
            "{:<4} {:<13} {}",
            index + 1,
            item.id,
            item.title.as_deref().unwrap_or("-")
        );
    }
    println!("{} item(s)", items.len());
    Ok(())
}
