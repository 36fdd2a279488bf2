use pixxel8_lib::gate::GateDecision;
use pixxel8_lib::grid::{GridCatalog, GridError, GridSlot, GridTemplateUpdate};
use pixxel8_lib::storage::{GRID_STORAGE_KEY, KeyValueStore, MemoryStore};
use std::sync::Arc;

fn open() -> (Arc<dyn KeyValueStore>, GridCatalog) {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let catalog = GridCatalog::open(Arc::clone(&kv));
    (kv, catalog)
}

fn full_slot(id: &str) -> GridSlot {
    GridSlot {
        id: id.to_string(),
        x: 0.0,
        y: 0.0,
        width: 100.0,
        height: 100.0,
        radius: None,
        z_index: None,
    }
}

#[test]
fn test_first_open_seeds_builtins() {
    let (kv, catalog) = open();

    let ids: Vec<_> = catalog.templates().into_iter().map(|t| t.id).collect();
    assert_eq!(ids.len(), 6);
    assert!(ids.contains(&"grid_2x2_classic".to_string()));
    assert_eq!(catalog.active_id().as_deref(), Some("single_portrait"));

    // 内置模板立即写入存储
    assert!(kv.get(GRID_STORAGE_KEY).unwrap().is_some());
}

#[test]
fn test_templates_for_still_count() {
    let (_kv, catalog) = open();

    let four: Vec<_> = catalog
        .templates_for_still_count(4)
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(four, vec!["grid_2x2_classic", "strip_4_vertical"]);

    catalog
        .update(
            "strip_4_vertical",
            GridTemplateUpdate {
                is_enabled: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(catalog.templates_for_still_count(4).len(), 1);
    assert!(catalog.templates_for_still_count(9).is_empty());
}

#[test]
fn test_set_active_outside_session() {
    let (_kv, catalog) = open();
    assert_eq!(catalog.set_active("grid_3x2"), Ok(GateDecision::Applied));
    assert_eq!(catalog.active().unwrap().still_count, 6);
    assert_eq!(catalog.set_active("grid_3x2"), Ok(GateDecision::Unchanged));
}

#[test]
fn test_set_active_errors() {
    let (_kv, catalog) = open();
    assert_eq!(
        catalog.set_active("missing"),
        Err(GridError::NotFound("missing".to_string()))
    );

    catalog
        .update(
            "grid_3x2",
            GridTemplateUpdate {
                is_enabled: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(
        catalog.set_active("grid_3x2"),
        Err(GridError::Disabled("grid_3x2".to_string()))
    );
}

#[test]
fn test_switch_in_session_is_queued() {
    let (_kv, catalog) = open();
    catalog.on_session_start();
    assert!(!catalog.can_apply_immediately());

    assert_eq!(catalog.set_active("split_2_vertical"), Ok(GateDecision::Queued));
    assert_eq!(catalog.set_active("grid_3x2"), Ok(GateDecision::Queued));
    assert_eq!(catalog.active_id().as_deref(), Some("single_portrait"));
    assert_eq!(catalog.pending_id().as_deref(), Some("grid_3x2"));

    assert_eq!(catalog.on_session_end().as_deref(), Some("grid_3x2"));
    assert_eq!(catalog.active_id().as_deref(), Some("grid_3x2"));
    assert!(catalog.pending_id().is_none());
    assert!(catalog.can_apply_immediately());
}

#[test]
fn test_active_template_locked_in_session() {
    let (_kv, catalog) = open();
    catalog.on_session_start();

    let rename = GridTemplateUpdate {
        name: Some("Renamed".to_string()),
        ..Default::default()
    };
    assert_eq!(
        catalog.update("single_portrait", rename.clone()),
        Err(GridError::ActiveLocked("single_portrait".to_string()))
    );
    assert_eq!(
        catalog.remove("single_portrait"),
        Err(GridError::ActiveLocked("single_portrait".to_string()))
    );

    // 其他模板仍可编辑
    assert_eq!(catalog.update("grid_3x2", rename).unwrap().name, "Renamed");
}

#[test]
fn test_invalid_update_keeps_original() {
    let (_kv, catalog) = open();
    let before = catalog.template("grid_2x2_classic").unwrap();

    let result = catalog.update(
        "grid_2x2_classic",
        GridTemplateUpdate {
            still_count: Some(3),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(GridError::Invalid { .. })));
    assert_eq!(catalog.template("grid_2x2_classic").unwrap(), before);
}

#[test]
fn test_add_validates_and_rejects_duplicates() {
    let (_kv, catalog) = open();

    let mut template = catalog.template("single_portrait").unwrap();
    template.id = "custom_full_bleed".to_string();
    template.name = "Full Bleed".to_string();
    template.slots = vec![full_slot("s1")];
    catalog.add(template.clone()).unwrap();
    assert!(catalog.template("custom_full_bleed").is_some());

    assert_eq!(
        catalog.add(template.clone()),
        Err(GridError::DuplicateId("custom_full_bleed".to_string()))
    );

    template.id = "custom_overflow".to_string();
    template.slots[0].x = 10.0;
    assert!(matches!(catalog.add(template), Err(GridError::Invalid { .. })));
}

#[test]
fn test_remove_active_falls_back() {
    let (_kv, catalog) = open();
    catalog.set_active("grid_3x2").unwrap();

    let removed = catalog.remove("grid_3x2").unwrap();
    assert_eq!(removed.id, "grid_3x2");
    assert_eq!(catalog.active_id().as_deref(), Some("single_portrait"));
    assert!(catalog.template("grid_3x2").is_none());
}

#[test]
fn test_remove_pending_target_clears_switch() {
    let (_kv, catalog) = open();
    catalog.on_session_start();
    catalog.set_active("grid_3x2").unwrap();

    catalog.remove("grid_3x2").unwrap();
    assert!(catalog.pending_id().is_none());
    assert!(catalog.on_session_end().is_none());
    assert_eq!(catalog.active_id().as_deref(), Some("single_portrait"));
}

#[test]
fn test_duplicate_template() {
    let (_kv, catalog) = open();
    let first = catalog.duplicate("grid_2x2_classic").unwrap();
    let second = catalog.duplicate("grid_2x2_classic").unwrap();

    assert!(first.id.starts_with("grid_"));
    assert_ne!(first.id, second.id);
    assert_eq!(first.name, "2×2 Classic (Copy)");
    assert_eq!(first.slots, catalog.template("grid_2x2_classic").unwrap().slots);
    assert_eq!(
        catalog.duplicate("missing"),
        Err(GridError::NotFound("missing".to_string()))
    );
}

#[test]
fn test_catalog_survives_restart() {
    let (kv, catalog) = open();
    catalog.set_active("strip_4_vertical").unwrap();
    catalog.on_session_start();
    catalog.set_active("grid_3x2").unwrap();
    catalog.duplicate("single_portrait").unwrap();
    drop(catalog);

    let reopened = GridCatalog::open(kv);
    assert_eq!(reopened.templates().len(), 7);
    assert_eq!(reopened.active_id().as_deref(), Some("strip_4_vertical"));
    assert_eq!(reopened.pending_id().as_deref(), Some("grid_3x2"));

    assert_eq!(reopened.on_session_end().as_deref(), Some("grid_3x2"));
}
