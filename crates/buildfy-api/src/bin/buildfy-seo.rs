//! Writes `sitemap.xml` and `robots.txt` for the static site.
//!
//! ```bash
//! SITE_URL=https://buildfy.app buildfy-seo public/
//! ```

use anyhow::Context;
use buildfy_api::seo::{render_robots, render_sitemap, DISALLOWED_PATHS, SEO_ROUTES};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    dotenvy::dotenv().ok();

    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "public".to_string()));
    let site_url = std::env::var("SITE_URL").unwrap_or_else(|_| "https://buildfy.app".to_string());
    let today = chrono::Utc::now().date_naive();

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let sitemap_path = out_dir.join("sitemap.xml");
    std::fs::write(&sitemap_path, render_sitemap(&site_url, SEO_ROUTES, today))
        .with_context(|| format!("Failed to write {}", sitemap_path.display()))?;

    let robots_path = out_dir.join("robots.txt");
    std::fs::write(&robots_path, render_robots(&site_url, DISALLOWED_PATHS))
        .with_context(|| format!("Failed to write {}", robots_path.display()))?;

    info!(
        "Wrote {} ({} routes) and {} for {}",
        sitemap_path.display(),
        SEO_ROUTES.len(),
        robots_path.display(),
        site_url
    );
    Ok(())
}
