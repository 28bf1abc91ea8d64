//! # SEO
//!
//! `sitemap.xml` and `robots.txt` for the public site, rendered from a fixed
//! route list. Served live by the API and written to disk by `buildfy-seo`.

use crate::state::AppState;
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};
use chrono::NaiveDate;

/// A public page
#[derive(Debug, Clone, Copy)]
pub struct SeoRoute {
    pub path: &'static str,
    pub changefreq: &'static str,
    pub priority: f32,
}

const fn route(path: &'static str, changefreq: &'static str, priority: f32) -> SeoRoute {
    SeoRoute {
        path,
        changefreq,
        priority,
    }
}

pub const SEO_ROUTES: &[SeoRoute] = &[
    route("/", "weekly", 1.0),
    route("/builder", "weekly", 0.9),
    route("/pricing", "monthly", 0.9),
    route("/docs", "weekly", 0.8),
    route("/templates", "weekly", 0.8),
    route("/about", "monthly", 0.6),
    route("/contact", "yearly", 0.5),
    route("/privacy", "yearly", 0.3),
    route("/terms", "yearly", 0.3),
];

/// Paths crawlers should stay out of
pub const DISALLOWED_PATHS: &[&str] = &["/api/", "/webhook/", "/dashboard"];

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn origin(site_url: &str) -> &str {
    site_url.trim().trim_end_matches('/')
}

/// sitemaps.org XML for `routes`
pub fn render_sitemap(site_url: &str, routes: &[SeoRoute], lastmod: NaiveDate) -> String {
    let origin = origin(site_url);
    let lastmod = lastmod.format("%Y-%m-%d").to_string();

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for route in routes {
        let loc = if route.path == "/" {
            format!("{}/", origin)
        } else {
            format!("{}{}", origin, route.path)
        };
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&loc)));
        xml.push_str(&format!("    <lastmod>{}</lastmod>\n", lastmod));
        xml.push_str(&format!("    <changefreq>{}</changefreq>\n", route.changefreq));
        xml.push_str(&format!("    <priority>{:.1}</priority>\n", route.priority));
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

pub fn render_robots(site_url: &str, disallow: &[&str]) -> String {
    let mut robots = String::from("User-agent: *\nAllow: /\n");
    for path in disallow {
        robots.push_str(&format!("Disallow: {}\n", path));
    }
    robots.push_str(&format!("\nSitemap: {}/sitemap.xml\n", origin(site_url)));
    robots
}

/// GET /sitemap.xml
pub async fn sitemap(State(state): State<AppState>) -> impl IntoResponse {
    let today = chrono::Utc::now().date_naive();
    (
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        render_sitemap(&state.config.site_url, SEO_ROUTES, today),
    )
}

/// GET /robots.txt
pub async fn robots(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        render_robots(&state.config.site_url, DISALLOWED_PATHS),
    )
}
