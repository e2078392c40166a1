//! Fetch-interception strategy classification and the download-handler's
//! header rewriting (§4.H fetch interception strategies, §6 content-type
//! map).

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStrategy {
    PassThrough,
    NetworkOnly,
    DownloadHandler,
    External,
    ApiNetworkFirst,
    Navigation,
    StaticCacheFirst,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub path: String,
    pub same_origin: bool,
    pub query: HashMap<String, String>,
    pub is_navigation: bool,
}

#[derive(Debug, Clone)]
pub struct WorkerRouting {
    pub build_asset_prefix: String,
    pub api_prefix: String,
}

impl Default for WorkerRouting {
    fn default() -> Self {
        WorkerRouting {
            build_asset_prefix: "/_app/".to_string(),
            api_prefix: "/api/".to_string(),
        }
    }
}

/// First-match-wins classification per §4.H's strategy table.
pub fn classify(request: &FetchRequest, routing: &WorkerRouting) -> FetchStrategy {
    if request.method != "GET" {
        return FetchStrategy::PassThrough;
    }
    if request.path.starts_with(&routing.build_asset_prefix) {
        return FetchStrategy::NetworkOnly;
    }
    if request.query.contains_key("download") {
        return FetchStrategy::DownloadHandler;
    }
    if !request.same_origin {
        return FetchStrategy::External;
    }
    if request.path.starts_with(&routing.api_prefix) {
        return FetchStrategy::ApiNetworkFirst;
    }
    if request.is_navigation {
        return FetchStrategy::Navigation;
    }
    FetchStrategy::StaticCacheFirst
}

/// §6 content-type→extension map for the download handler.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    match content_type {
        "application/pdf" => "pdf",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-powerpoint" => "ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.slideshow" => "ppsx",
        _ => "bin",
    }
}

/// Empty upstream `Content-Type` is normalized to `application/octet-stream`.
pub fn resolve_content_type(upstream: Option<&str>) -> String {
    match upstream {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

fn sanitize_filename(name: &str) -> String {
    name.chars().filter(|c| !matches!(c, '"' | '\\' | '\n' | '\r')).collect()
}

/// Picks the download filename: the `filename` query param verbatim if
/// non-empty, else `download.<ext>`.
pub fn download_filename(query: &HashMap<String, String>, content_type: &str) -> String {
    match query.get("filename") {
        Some(name) if !name.is_empty() => sanitize_filename(name),
        _ => format!("download.{}", extension_for_content_type(content_type)),
    }
}

pub fn content_disposition_header(filename: &str) -> String {
    format!("attachment; filename=\"{}\"", sanitize_filename(filename))
}
