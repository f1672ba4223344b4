//! `@NAME@` sentinel substitution for WGSL templates.
//!
//! Sentinels are upper-case (`@TILE@`, `@OP_BODY@`) so they can never collide
//! with WGSL attributes, which are lower-case (`@compute`, `@builtin`).

use crate::error::{ProgramError, Result};

/// Typed parameters of one template, flattened into sentinel values.
pub trait TemplateParams {
    fn substitutions(&self) -> Vec<(&'static str, String)>;
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderTemplate {
    pub name: &'static str,
    pub source: &'static str,
}

impl ShaderTemplate {
    pub const fn new(name: &'static str, source: &'static str) -> Self {
        Self { name, source }
    }

    pub fn render(&self, params: &impl TemplateParams) -> Result<String> {
        let rendered = render(self.source, &params.substitutions())?;
        log::trace!("rendered template {} ({} bytes)", self.name, rendered.len());
        Ok(rendered)
    }
}

/// Replaces every `@KEY@` with its value; fails if a sentinel is left over.
pub fn render(source: &str, substitutions: &[(&str, String)]) -> Result<String> {
    let mut out = source.to_string();
    for (key, value) in substitutions {
        out = out.replace(&format!("@{key}@"), value);
    }
    if let Some(name) = find_sentinel(&out) {
        return Err(ProgramError::UnresolvedPlaceholder(name.to_string()));
    }
    Ok(out)
}

fn find_sentinel(source: &str) -> Option<&str> {
    let bytes = source.as_bytes();
    let mut start = 0;
    while let Some(offset) = source[start..].find('@') {
        let open = start + offset;
        let name_start = open + 1;
        let mut end = name_start;
        while end < bytes.len() && is_sentinel_byte(bytes[end]) {
            end += 1;
        }
        if end > name_start && end < bytes.len() && bytes[end] == b'@' {
            return Some(&source[name_start..end]);
        }
        start = name_start;
    }
    None
}

fn is_sentinel_byte(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte.is_ascii_digit() || byte == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_all_occurrences() {
        let out = render(
            "var<workgroup> t: array<f32, @TILE@>; let n = @TILE@u;",
            &[("TILE", "16".to_string())],
        )
        .unwrap();
        assert_eq!(out, "var<workgroup> t: array<f32, 16>; let n = 16u;");
    }

    #[test]
    fn wgsl_attributes_are_not_sentinels() {
        let src = "@compute @workgroup_size(64, 1, 1)\nfn main(@builtin(global_invocation_id) gid: vec3<u32>) {}";
        assert_eq!(render(src, &[]).unwrap(), src);
    }

    #[test]
    fn leftover_sentinel_is_an_error() {
        let err = render("let m = @M@u; let n = @N@u;", &[("M", "3".into())]).unwrap_err();
        assert_eq!(err, ProgramError::UnresolvedPlaceholder("N".to_string()));
    }
}
