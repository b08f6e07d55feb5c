//! Type declaration sidecar generation (`<group>.d.ts`).
//!
//! Each export of the generated module gets a matching `declare const`,
//! typed through the runtime helpers against the declaration-source
//! namespace (`typeof _source.<name>`). The declarations depend only on the
//! collection shapes, never on discovered files, so content edits rewrite
//! the sidecar byte-identically and only a declaration change moves it.

use super::OutputGroup;
use super::module::{js_str, source_specifier};
use crate::config::{CollectionDecl, LoadedConfig};
use std::fmt::Write as _;
use std::path::Path;

pub(crate) fn generate_types(
    config: &LoadedConfig,
    group: &OutputGroup,
    out_dir: &Path,
) -> String {
    let has_async = group
        .collections
        .iter()
        .any(|(_, decl)| decl.as_doc().is_some_and(|d| d.async_load));

    let mut out = String::new();
    let _ = writeln!(out, "// config-hash: {}", config.hash);
    let runtime = &config.global.runtime_module;
    let _ = writeln!(out, "import type {{ _runtime }} from {};", js_str(runtime));
    if has_async {
        let _ = writeln!(
            out,
            "import type {{ _runtimeAsync }} from {};",
            js_str(&format!("{runtime}/runtime/async"))
        );
    }
    let _ = writeln!(
        out,
        "import type * as _source from {};",
        js_str(&source_specifier(config, out_dir))
    );

    for (name, decl) in &group.collections {
        let helper = match decl {
            CollectionDecl::Meta(_) => "_runtime.meta",
            CollectionDecl::Doc(doc) if doc.async_load => "_runtimeAsync.doc",
            CollectionDecl::Doc(_) => "_runtime.doc",
            CollectionDecl::Docs(pair) if pair.doc.async_load => "_runtimeAsync.docs",
            CollectionDecl::Docs(_) => "_runtime.docs",
        };
        let _ = writeln!(
            out,
            "export declare const {name}: ReturnType<typeof {helper}<typeof _source.{name}>>;"
        );
    }
    out
}
