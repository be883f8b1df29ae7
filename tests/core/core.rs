use architect::core::error::ArchitectError;
use architect::core::mutation::{self, MutationType};
use architect::core::render;
use architect::core::schemas::{ARCHITECT_STATE_FILE, NodeKind};
use architect::core::store::{self, ArchitectState, Store};
use architect::core::summary;
use regex::Regex;
use serde_json::{Value, json};
use std::fs;
use tempfile::tempdir;

fn partial(tag: &str, mutation_type: &str, id: &str, literal: &str) -> String {
    format!(
        "<MutationPartial>\n  <{tag} mutationType=\"{mutation_type}\" id=\"{id}\">\n    <![CDATA[{literal}]]>\n  </{tag}>\n</MutationPartial>\n"
    )
}

fn apply(state: &mut ArchitectState, text: &str) -> mutation::ApplyOutcome {
    mutation::apply_mutation_text(state, text).expect("response should apply")
}

#[test]
fn versions_grow_by_one_per_update() {
    let mut state = ArchitectState::empty();
    apply(&mut state, &partial("Module", "Create", "Billing.module", "{ title: 'Billing' }"));
    for expected in 2..=4u64 {
        let outcome = apply(
            &mut state,
            &partial("Module", "Update", "Billing.module", "{ title: 'Billing v' }"),
        );
        assert_eq!(outcome.applications[0].previous_version, Some(expected - 1));
        assert_eq!(outcome.applications[0].next_version, Some(expected));
    }
    let record = state.get(NodeKind::Module, "Billing.module").unwrap();
    assert_eq!(store::record_version(record), Some(4));
}

#[test]
fn update_on_missing_node_starts_at_one() {
    let mut state = ArchitectState::empty();
    apply(&mut state, &partial("Entity", "Update", "Billing.module/Invoice.entity", "{ title: 'Invoice' }"));
    let record = state.get(NodeKind::Entity, "Billing.module/Invoice.entity").unwrap();
    assert_eq!(store::record_version(record), Some(1));
}

#[test]
fn create_on_existing_node_resets_version() {
    let mut state = ArchitectState::empty();
    apply(&mut state, &partial("Module", "Create", "Core.module", "{ title: 'Core' }"));
    apply(&mut state, &partial("Module", "Update", "Core.module", "{ title: 'Core' }"));
    apply(&mut state, &partial("Module", "Create", "Core.module", "{ title: 'Core again' }"));
    let record = state.get(NodeKind::Module, "Core.module").unwrap();
    assert_eq!(store::record_version(record), Some(1));
    assert_eq!(record["title"], "Core again");
}

#[test]
fn delete_is_idempotent() {
    let mut state = ArchitectState::empty();
    apply(&mut state, &partial("Enum", "Create", "Billing.module/Status.enum", "{ values: ['open'] }"));
    let delete = "<MutationPartial><Enum mutationType=\"Delete\" id=\"Billing.module/Status.enum\"/></MutationPartial>";

    let first = apply(&mut state, delete);
    assert_eq!(first.applications.len(), 1);
    assert_eq!(first.applications[0].mutation_type, MutationType::Delete);
    let after_first = state.clone();

    let second = apply(&mut state, delete);
    assert!(second.applications.is_empty());
    assert_eq!(state, after_first);
}

#[test]
fn unknown_category_is_a_silent_no_op() {
    let mut state = ArchitectState::empty();
    let outcome = apply(&mut state, &partial("Widget", "Create", "x.widget", "{ title: 'x' }"));
    assert!(outcome.applications.is_empty());
    assert!(outcome.errors.is_empty());
    assert!(state.is_initial());
}

#[test]
fn create_then_update_replaces_record_wholesale() {
    let mut state = ArchitectState::empty();
    let text = format!(
        "{}{}",
        partial(
            "Module",
            "Create",
            "Expense.module",
            "{ title: 'Expense', businessDesc: 'Claims', dependency: { moduleIds: ['Common.module'] } }"
        ),
        partial("Module", "Update", "Expense.module", "{ title: 'Expense & Reimbursement' }")
    );
    let outcome = apply(&mut state, &text);
    assert_eq!(outcome.applications.len(), 2);

    let record = state.get(NodeKind::Module, "Expense.module").unwrap();
    assert_eq!(
        Value::Object(record.clone()),
        json!({"title": "Expense & Reimbursement", "version": 2})
    );
    assert!(!record.contains_key("dependency"));
    assert!(!record.contains_key("businessDesc"));
}

#[test]
fn malformed_payload_drops_only_its_edit() {
    let mut state = ArchitectState::empty();
    let text = format!(
        "{}{}",
        partial("Module", "Create", "Good.module", "{ title: 'Good' }"),
        partial("Module", "Create", "Bad.module", "{ title: process.exit(1) }")
    );
    let outcome = apply(&mut state, &text);
    assert_eq!(outcome.applications.len(), 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(state.get(NodeKind::Module, "Bad.module").is_none());
}

#[test]
fn all_malformed_response_is_rejected() {
    let mut state = ArchitectState::empty();
    let err = mutation::apply_mutation_text(
        &mut state,
        &partial("Module", "Create", "Bad.module", "{ title: `${x}` }"),
    )
    .unwrap_err();
    assert!(matches!(err, ArchitectError::ParseError { .. }));
    assert!(state.is_initial());
}

#[test]
fn response_without_blocks_is_a_no_op() {
    let mut state = ArchitectState::empty();
    let outcome = apply(&mut state, "No changes are needed.");
    assert!(outcome.applications.is_empty());
    assert!(outcome.errors.is_empty());
}

#[test]
fn primitive_record_rederives_from_rendering() {
    let mut state = ArchitectState::empty();
    apply(
        &mut state,
        &partial(
            "Entity",
            "Create",
            "Billing.module/Invoice.entity",
            "{ title: 'Invoice', businessDesc: 'A <bill> & \"co\"', amount: 12.5, paid: false, count: 3 }",
        ),
    );
    let record = state.get(NodeKind::Entity, "Billing.module/Invoice.entity").unwrap();
    let xml = render::render_node_xml(NodeKind::Entity, "Billing.module/Invoice.entity", record);

    let element = Regex::new(r"(?m)^  <(\w+)>(.*)</\w+>$").unwrap();
    let mut derived = serde_json::Map::new();
    for caps in element.captures_iter(&xml) {
        let raw = &caps[2];
        let value = if let Some(inner) = raw.strip_prefix("<![CDATA[").and_then(|r| r.strip_suffix("]]>")) {
            Value::String(inner.replace("]]]]><![CDATA[>", "]]>"))
        } else if raw == "true" || raw == "false" {
            Value::Bool(raw == "true")
        } else {
            serde_json::from_str(raw).unwrap()
        };
        derived.insert(caps[1].to_string(), value);
    }

    for (key, value) in record {
        assert_eq!(derived.get(key), Some(value), "field {}", key);
    }
    assert_eq!(derived.len(), record.len());
}

#[test]
fn rendering_puts_priority_fields_first() {
    let mut state = ArchitectState::empty();
    apply(
        &mut state,
        &partial("Page", "Create", "Web.module/Home.page", "{ route: '/', techSummary: 'SSR', title: 'Home' }"),
    );
    let record = state.get(NodeKind::Page, "Web.module/Home.page").unwrap();
    let xml = render::render_node_xml(NodeKind::Page, "Web.module/Home.page", record);
    let order: Vec<&str> = xml
        .lines()
        .skip(2)
        .filter_map(|l| l.trim().strip_prefix('<'))
        .filter_map(|l| l.split(['>', '/']).next())
        .filter(|t| !t.is_empty())
        .collect();
    assert_eq!(order, vec!["version", "title", "techSummary", "route"]);
}

#[test]
fn save_load_round_trip_and_reconciliation() {
    let tmp = tempdir().unwrap();
    let store = Store::for_project(tmp.path());
    let mut state = store.load().unwrap();
    apply(
        &mut state,
        &format!(
            "{}{}",
            partial("Module", "Create", "Billing.module", "{ title: 'Billing' }"),
            partial("Entity", "Create", "Billing.module/ledger/Entry.entity", "{ title: 'Entry' }")
        ),
    );
    store.save(&state).unwrap();

    let entity_path = store.root.join("Billing.module/ledger/Entry.entity");
    assert!(store.root.join("Billing.module").is_dir());
    assert!(entity_path.is_file());
    let reloaded = store.load().unwrap();
    assert_eq!(reloaded, state);

    let stray = store.root.join("stale/Orphan.page");
    fs::create_dir_all(stray.parent().unwrap()).unwrap();
    fs::write(&stray, "<Page/>").unwrap();

    apply(
        &mut state,
        "<MutationPartial><Entity mutationType=\"Delete\" id=\"Billing.module/ledger/Entry.entity\"/></MutationPartial>",
    );
    let report = store.save(&state).unwrap();

    assert!(!entity_path.exists());
    assert!(!store.root.join("Billing.module/ledger").exists());
    assert!(!stray.exists());
    assert!(!store.root.join("stale").exists());
    assert!(report.removed.contains(&stray));
    assert!(store.root.join("Billing.module").is_file());
    assert!(store.root.join(ARCHITECT_STATE_FILE).is_file());
    assert!(store.prompt_dir().is_dir());
}

#[test]
fn surviving_snapshots_are_left_untouched_by_a_delete() {
    let tmp = tempdir().unwrap();
    let store = Store::for_project(tmp.path());
    let mut state = store.load().unwrap();
    apply(
        &mut state,
        &format!(
            "{}{}",
            partial("Module", "Create", "Billing.module", "{ title: 'Billing' }"),
            partial("Module", "Create", "Shipping.module", "{ title: 'Shipping' }")
        ),
    );
    store.save(&state).unwrap();

    let billing = store.root.join("Billing.module");
    let shipping = store.root.join("Shipping.module");
    let billing_before = fs::read(&billing).unwrap();
    assert!(shipping.is_file());

    apply(
        &mut state,
        "<MutationPartial><Module mutationType=\"Delete\" id=\"Shipping.module\"/></MutationPartial>",
    );
    let report = store.save(&state).unwrap();

    assert!(!shipping.exists());
    assert_eq!(report.removed, vec![shipping]);
    assert_eq!(fs::read(&billing).unwrap(), billing_before);
    assert!(!report.written.contains(&billing));
    assert!(report.written.is_empty());
}

#[test]
fn unsafe_ids_never_leave_the_root() {
    let tmp = tempdir().unwrap();
    let store = Store::for_project(tmp.path());
    let mut state = ArchitectState::empty();
    apply(&mut state, &partial("Module", "Create", "../escape.module", "{ title: 'x' }"));
    apply(&mut state, &partial("Module", "Create", "state.json", "{ title: 'x' }"));
    store.save(&state).unwrap();

    assert!(!tmp.path().join("openspec/escape.module").exists());
    let blob: Value = serde_json::from_str(&fs::read_to_string(store.state_path()).unwrap()).unwrap();
    assert!(blob["Module"]["state.json"].is_object());
}

#[test]
fn summary_keeps_only_context_fields() {
    let mut state = ArchitectState::empty();
    let long = "x".repeat(500);
    apply(
        &mut state,
        &partial(
            "Module",
            "Create",
            "Billing.module",
            &format!("{{ title: 'Billing', techSummary: '{long}', owner: 'team', dependency: {{ moduleIds: [] }} }}"),
        ),
    );
    let digest = summary::summarise_state(&state);
    assert_eq!(digest.len(), 1);
    let entry = &digest["Module"][0];
    assert_eq!(entry["id"], "Billing.module");
    assert_eq!(entry["version"], 1);
    assert!(entry.get("owner").is_none());
    assert_eq!(entry["dependency"], json!({"moduleIds": []}));
    assert!(entry["techSummary"].as_str().unwrap().chars().count() <= 241);
}
