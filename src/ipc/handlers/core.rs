use crate::catalog::{Catalog, CatalogSource};
use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{respond, store, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn catalog_source_json(source: &CatalogSource) -> serde_json::Value {
    match source {
        CatalogSource::BuiltIn => json!("builtIn"),
        CatalogSource::File(p) => json!(p.to_string_lossy()),
    }
}

/// Opens (or creates) the workspace database and loads its catalog. The
/// previous workspace stays selected if anything fails.
pub fn select_workspace(
    state: &mut AppState,
    path: PathBuf,
) -> Result<serde_json::Value, HandlerErr> {
    let catalog = Catalog::load_for_workspace(&path).map_err(|e| {
        tracing::error!(error = %e, "catalog rejected");
        HandlerErr::new("catalog_invalid", e.to_string())
    })?;
    let (conn, caps) = db::open_db(&path, state.config.schema_mode).map_err(|e| {
        tracing::error!(error = ?e, path = %path.display(), "failed to open workspace");
        HandlerErr::new("db_open_failed", format!("{e:?}"))
    })?;

    tracing::info!(path = %path.display(), ?caps, "workspace selected");
    let result = json!({
        "workspacePath": path.to_string_lossy(),
        "schema": caps,
        "catalog": catalog_source_json(catalog.source()),
    });
    state.workspace = Some(path);
    state.db = Some(conn);
    state.caps = caps;
    state.catalog = catalog;
    Ok(result)
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return HandlerErr::bad_params("missing params.path").response(&req.id);
    };
    respond(&req.id, select_workspace(state, path))
}

fn handle_schema_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = store(state).map(|_| {
        json!({
            "schema": state.caps,
            "complete": state.caps.is_complete(),
            "migrationSql": db::migration_sql(),
        })
    });
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "schema.status" => Some(handle_schema_status(state, req)),
        _ => None,
    }
}
