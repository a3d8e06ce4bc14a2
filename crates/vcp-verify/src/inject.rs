//! Injection formatting for verified bundles
//!
//! Renders a verified bundle (or a layer-ordered set) into the bounded
//! system-prompt blob. Header-delimited is the reference format.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use vcp_core::types::format_utc;
use vcp_core::{Bundle, Result, VcpError};

/// Supported injection formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionFormat {
    /// Line-oriented banner with BEGIN/END delimiters (reference)
    #[default]
    HeaderDelimited,
    /// Single `<vcp-constitution>` element with attributes
    XmlTagged,
    /// One-line header then content
    Minimal,
}

/// Options for formatting injection output.
#[derive(Debug, Clone)]
pub struct InjectionOptions {
    pub format: InjectionFormat,
    pub include_tokens: bool,
    pub include_attestation: bool,
    pub hash_prefix_length: usize,
    pub hash_suffix_length: usize,
}

impl Default for InjectionOptions {
    fn default() -> Self {
        Self {
            format: InjectionFormat::HeaderDelimited,
            include_tokens: true,
            include_attestation: true,
            hash_prefix_length: 8,
            hash_suffix_length: 4,
        }
    }
}

/// Format a verified bundle for system-prompt injection.
pub fn format_injection(
    bundle: &Bundle,
    options: &InjectionOptions,
    verified_at: DateTime<Utc>,
) -> String {
    match options.format {
        InjectionFormat::HeaderDelimited => format_header_delimited(bundle, options, verified_at),
        InjectionFormat::XmlTagged => format_xml_tagged(bundle, options, verified_at),
        InjectionFormat::Minimal => format_minimal(bundle),
    }
}

fn hash_display(content_hash: &str, prefix: usize, suffix: usize) -> String {
    let hash_value = content_hash.split(':').nth(1).unwrap_or(content_hash);
    if hash_value.len() <= prefix + suffix {
        return hash_value.to_string();
    }
    format!(
        "{}...{}",
        &hash_value[..prefix],
        &hash_value[hash_value.len() - suffix..]
    )
}

fn format_header_delimited(
    bundle: &Bundle,
    options: &InjectionOptions,
    verified_at: DateTime<Utc>,
) -> String {
    let manifest = &bundle.manifest;
    let hash = hash_display(
        &manifest.bundle.content_hash,
        options.hash_prefix_length,
        options.hash_suffix_length,
    );

    let mut lines = vec![
        format!("[VCP:{}]", manifest.vcp_version),
        format!("[ID:{}@{}]", manifest.bundle.id, manifest.bundle.version),
        format!("[HASH:{hash}]"),
    ];

    if options.include_tokens {
        lines.push(format!("[TOKENS:{}]", manifest.budget.token_count));
    }
    if options.include_attestation {
        let attestation = &manifest.safety_attestation;
        lines.push(format!(
            "[ATTESTED:{}:{}]",
            attestation.attestation_type.as_str(),
            attestation.auditor
        ));
    }

    lines.push(format!("[VERIFIED:{}]", format_utc(verified_at)));
    lines.push("---BEGIN-CONSTITUTION---".to_string());
    lines.push(bundle.content.trim_end().to_string());
    lines.push("---END-CONSTITUTION---".to_string());
    lines.join("\n")
}

fn format_xml_tagged(
    bundle: &Bundle,
    options: &InjectionOptions,
    verified_at: DateTime<Utc>,
) -> String {
    let manifest = &bundle.manifest;
    let hash = hash_display(
        &manifest.bundle.content_hash,
        options.hash_prefix_length,
        options.hash_suffix_length,
    );

    let mut attrs = vec![
        format!("version=\"{}\"", manifest.vcp_version),
        format!("id=\"{}\"", manifest.bundle.id),
        format!("bundle_version=\"{}\"", manifest.bundle.version),
        format!("hash=\"{hash}\""),
    ];

    if options.include_tokens {
        attrs.push(format!("tokens=\"{}\"", manifest.budget.token_count));
    }
    if options.include_attestation {
        let attestation = &manifest.safety_attestation;
        attrs.push(format!(
            "attestation=\"{}\"",
            attestation.attestation_type.as_str()
        ));
        attrs.push(format!("auditor=\"{}\"", attestation.auditor));
    }
    attrs.push(format!("verified=\"{}\"", format_utc(verified_at)));

    format!(
        "<vcp-constitution {}>\n{}\n</vcp-constitution>",
        attrs.join(" "),
        bundle.content.trim_end()
    )
}

fn format_minimal(bundle: &Bundle) -> String {
    let manifest = &bundle.manifest;
    let hash_value = manifest
        .bundle
        .content_hash
        .split(':')
        .nth(1)
        .unwrap_or(&manifest.bundle.content_hash);
    let short = &hash_value[..hash_value.len().min(8)];
    format!(
        "# Constitution: {}@{} [{short}]\n\n{}",
        manifest.bundle.id,
        manifest.bundle.version,
        bundle.content.trim_end()
    )
}

/// Format multiple verified bundles as a layered composition.
///
/// Bundles are ordered by their composition layer; the precedence line
/// lists distinct layers in ascending order.
///
/// # Errors
///
/// Returns [`VcpError::Invalid`] when `bundles` is empty.
pub fn format_multi_injection(
    bundles: &[Bundle],
    options: &InjectionOptions,
    verified_at: DateTime<Utc>,
) -> Result<String> {
    if bundles.is_empty() {
        return Err(VcpError::invalid("at least one bundle required"));
    }
    if bundles.len() == 1 {
        return Ok(format_injection(&bundles[0], options, verified_at));
    }

    let layer_of = |bundle: &Bundle, index: usize| -> i32 {
        bundle
            .manifest
            .composition
            .as_ref()
            .map(|c| c.layer)
            .unwrap_or(index as i32 + 1)
    };

    let mut sorted: Vec<(i32, &Bundle)> = bundles
        .iter()
        .enumerate()
        .map(|(i, b)| (layer_of(b, i), b))
        .collect();
    sorted.sort_by_key(|(layer, _)| *layer);

    let mut lines = vec![
        "[VCP:1.0]".to_string(),
        "[COMPOSITION:layered]".to_string(),
        format!("[LAYERS:{}]", bundles.len()),
    ];

    for (layer, bundle) in &sorted {
        let manifest = &bundle.manifest;
        let hash = hash_display(&manifest.bundle.content_hash, 8, 4);
        lines.push(format!(
            "[LAYER:{layer}:{}@{}:{hash}]",
            manifest.bundle.id, manifest.bundle.version
        ));
    }

    let layers: BTreeSet<i32> = sorted.iter().map(|(layer, _)| *layer).collect();
    let precedence: Vec<String> = layers.iter().map(i32::to_string).collect();
    lines.push(format!("[PRECEDENCE:{}]", precedence.join(">")));

    lines.push(format!("[VERIFIED:{}]", format_utc(verified_at)));
    lines.push("---BEGIN-CONSTITUTION---".to_string());

    for (layer, bundle) in &sorted {
        let manifest = &bundle.manifest;
        let mode = manifest
            .composition
            .as_ref()
            .map(|c| c.mode.as_str())
            .unwrap_or("extend");
        let title = manifest
            .metadata
            .get("title")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&manifest.bundle.id);
        lines.push(format!(
            "\n## Layer {layer}: {title} ({})",
            mode.to_uppercase()
        ));
        lines.push(bundle.content.trim_end().to_string());
    }

    lines.push("\n---END-CONSTITUTION---".to_string());
    Ok(lines.join("\n"))
}
