// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Named shader source fragments and their dependency resolution.
//!
//! Shader source is registered as named fragments.  A fragment may declare that it
//! needs another fragment first:
//!
//! ```text
//! #pragma require(common_math)
//! ```
//!
//! Resolving a fragment flattens all of its dependencies depth-first - order
//! preserving and duplicate free - before appending its own body, so the final
//! compilation unit is `[dependencies..., body]` no matter how many other fragments
//! also depend on them.  The pragma lines themselves are stripped from the output.
//!
//! # Example
//!
//! ```
//! use buffers_and_batches::pipeline::sources::SourceRegistry;
//!
//! let mut registry = SourceRegistry::new();
//! registry.register("math", "float srgb(float v) { return v; }\n");
//! registry.register("lib", "#pragma require(math)\nvec4 shade() { return vec4(1.0); }\n");
//! registry.register("main", "#pragma require(lib)\n#pragma require(math)\nvoid main() {}\n");
//!
//! let unit = registry.resolve("main").expect("resolves");
//! // math appears once, before lib, before the body
//! assert_eq!(unit.matches("srgb").count(), 1);
//! assert!(unit.find("srgb").unwrap() < unit.find("shade").unwrap());
//! assert!(unit.find("shade").unwrap() < unit.find("main").unwrap());
//! ```

use std::collections::HashMap;

/// A fragment name that no one registered.
#[derive(Debug, thiserror::Error)]
#[error("Unknown source fragment '{0}'")]
pub struct UnknownFragment(pub String);

const REQUIRE_PRAGMA: &str = "#pragma require(";

/// Process-scoped map of fragment name to body.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, String>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a fragment body.
    pub fn register(&mut self, name: &str, body: &str) {
        self.sources.insert(name.to_string(), body.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Flattens `name` and its transitive dependencies into one compilation unit.
    pub fn resolve(&self, name: &str) -> Result<String, UnknownFragment> {
        let mut seen = Vec::new();
        let mut out = String::new();
        self.resolve_into(name, &mut seen, &mut out)?;
        Ok(out)
    }

    fn resolve_into(
        &self,
        name: &str,
        seen: &mut Vec<String>,
        out: &mut String,
    ) -> Result<(), UnknownFragment> {
        if seen.iter().any(|s| s == name) {
            return Ok(());
        }
        seen.push(name.to_string());
        let body = self
            .sources
            .get(name)
            .ok_or_else(|| UnknownFragment(name.to_string()))?;
        for dependency in requires(body) {
            self.resolve_into(dependency, seen, out)?;
        }
        for line in body.lines() {
            if parse_require(line).is_none() {
                out.push_str(line);
                out.push('\n');
            }
        }
        Ok(())
    }
}

fn requires(body: &str) -> impl Iterator<Item = &str> {
    body.lines().filter_map(parse_require)
}

fn parse_require(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix(REQUIRE_PRAGMA)?;
    rest.strip_suffix(')')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diamond_dependencies_resolve_once() {
        let mut registry = SourceRegistry::new();
        registry.register("base", "B\n");
        registry.register("left", "#pragma require(base)\nL\n");
        registry.register("right", "#pragma require(base)\nR\n");
        registry.register("top", "#pragma require(left)\n#pragma require(right)\nT\n");
        assert_eq!(registry.resolve("top").unwrap(), "B\nL\nR\nT\n");
    }

    #[test]
    fn resolution_order_is_independent_of_other_dependents() {
        let mut registry = SourceRegistry::new();
        registry.register("a", "A\n");
        registry.register("b", "#pragma require(a)\nB\n");
        // resolving `a` first elsewhere must not change `b`'s unit
        let direct = registry.resolve("b").unwrap();
        registry.resolve("a").unwrap();
        assert_eq!(registry.resolve("b").unwrap(), direct);
        assert_eq!(direct, "A\nB\n");
    }

    #[test]
    fn unknown_dependency_is_reported() {
        let mut registry = SourceRegistry::new();
        registry.register("lonely", "#pragma require(missing)\nX\n");
        let err = registry.resolve("lonely").expect_err("missing dep");
        assert_eq!(err.0, "missing");
    }
}
