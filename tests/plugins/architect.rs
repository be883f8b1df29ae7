use architect::core::assets;
use architect::core::error::ArchitectError;
use architect::core::model::{ChatMessage, GenerationService, Role};
use architect::core::schemas::{NodeKind, PROMPT_DSL_OUTPUT};
use architect::core::store::{ArchitectState, Store};
use architect::core::repomap;
use architect::plugins::architect::{
    SyncRequest, WorkflowOptions, run_apply_response, run_init_architect,
    run_refine_architect, run_sync_code_to_architect,
};
use std::cell::RefCell;
use std::fs;
use tempfile::{TempDir, tempdir};

/// Scripted generation service that records every request it receives.
struct FakeModel {
    response: Result<String, String>,
    calls: RefCell<Vec<Vec<ChatMessage>>>,
}

impl FakeModel {
    fn replying(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl GenerationService for FakeModel {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ArchitectError> {
        self.calls.borrow_mut().push(messages.to_vec());
        self.response
            .clone()
            .map_err(ArchitectError::TransportError)
    }
}

const INIT_RESPONSE: &str = r#"Proposed modules:
<MutationPartial>
  <Module mutationType="Create" id="Expense.module">
    <![CDATA[{ title: "Expense", businessDesc: "Claims and reimbursement", dependency: { moduleIds: ["Common.module"] } }]]>
  </Module>
</MutationPartial>
<MutationPartial>
  <Module mutationType="Create" id="Common.module">
    <![CDATA[{ title: "Common" }]]>
  </Module>
</MutationPartial>
<MutationPartial>
  <ModuleRelationDiagram mutationType="Create" id="Overview.diagram">
    <![CDATA[{ title: "Overview", edges: [{ from: "Expense.module", to: "Common.module" }] }]]>
  </ModuleRelationDiagram>
</MutationPartial>
"#;

fn workspace() -> (TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::for_project(tmp.path());
    assets::install_prompts(&store, false).unwrap();
    (tmp, store)
}

fn seeded(store: &Store) -> ArchitectState {
    let mut state = store.load().unwrap();
    run_init_architect(
        store,
        &mut state,
        "Expense system",
        &FakeModel::replying(INIT_RESPONSE),
        &WorkflowOptions::default(),
    )
    .unwrap();
    state
}

#[test]
fn init_applies_persists_and_logs() {
    let (_tmp, store) = workspace();
    let mut state = store.load().unwrap();
    let model = FakeModel::replying(INIT_RESPONSE);

    let result = run_init_architect(
        &store,
        &mut state,
        "Build an expense reimbursement system.",
        &model,
        &WorkflowOptions::default(),
    )
    .unwrap();

    assert_eq!(result.applied.len(), 3);
    assert!(result.parse_errors.is_empty());
    assert!(store.state_path().is_file());
    assert!(store.root.join("Expense.module").is_file());
    assert!(store.root.join("Overview.diagram").is_file());
    assert_eq!(store.load().unwrap(), state);

    let log = result.mutation_log_path.expect("change log written");
    assert!(log.starts_with("openspec/architect/logs"));
    assert!(log.file_name().unwrap().to_string_lossy().starts_with("init-"));
    let logged = fs::read_to_string(store.project_root.join(&log)).unwrap();
    assert_eq!(logged, format!("{}\n", INIT_RESPONSE.trim()));

    let calls = model.calls.borrow();
    assert_eq!(calls.len(), 1);
    let roles: Vec<Role> = calls[0].iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::System, Role::System, Role::User]);
}

#[test]
fn dry_run_leaves_disk_untouched() {
    let (_tmp, store) = workspace();
    let mut state = seeded(&store);
    let blob_before = fs::read(store.state_path()).unwrap();
    let logs_before = fs::read_dir(store.log_dir()).unwrap().count();

    let response = r#"<MutationPartial>
  <Module mutationType="Update" id="Expense.module"><![CDATA[{ title: "Expense v2" }]]></Module>
</MutationPartial>
<MutationPartial>
  <Module mutationType="Delete" id="Common.module"/>
</MutationPartial>"#;
    let result = run_refine_architect(
        &store,
        &mut state,
        "rename the expense module",
        &FakeModel::replying(response),
        &WorkflowOptions {
            dry_run: true,
            change_id: Some("rename".to_string()),
        },
    )
    .unwrap();

    assert_eq!(result.applied.len(), 2);
    assert_eq!(result.applied[0].next_version, Some(2));
    assert!(result.mutation_log_path.is_none());
    assert_eq!(fs::read(store.state_path()).unwrap(), blob_before);
    assert_eq!(fs::read_dir(store.log_dir()).unwrap().count(), logs_before);
    assert!(store.root.join("Common.module").is_file());
    assert!(!store.project_root.join("openspec/changes/rename").exists());
    assert!(state.get(NodeKind::Module, "Common.module").is_some());
}

#[test]
fn refine_sends_state_digest_and_files_log_under_change() {
    let (_tmp, store) = workspace();
    let mut state = seeded(&store);
    let model = FakeModel::replying(
        r#"<MutationPartial><Module mutationType="Update" id="Common.module"><![CDATA[{ title: "Shared" }]]></Module></MutationPartial>"#,
    );

    let result = run_refine_architect(
        &store,
        &mut state,
        "rename Common to Shared",
        &model,
        &WorkflowOptions {
            dry_run: false,
            change_id: Some("rename-common".to_string()),
        },
    )
    .unwrap();

    assert_eq!(result.applied.len(), 1);
    let log = result.mutation_log_path.unwrap();
    assert!(log.starts_with("openspec/changes/rename-common/architect"));
    assert!(log.file_name().unwrap().to_string_lossy().starts_with("refine-"));

    let calls = model.calls.borrow();
    let user_messages: Vec<&str> = calls[0]
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(user_messages.len(), 2);
    assert!(user_messages[0].contains("\"Expense.module\""));
    assert!(user_messages[1].ends_with("rename Common to Shared"));

    let record = state.get(NodeKind::Module, "Common.module").unwrap();
    assert_eq!(record["title"], "Shared");
    assert_eq!(record["version"], 2);
}

#[test]
fn refine_without_prompt_never_calls_the_model() {
    let (_tmp, store) = workspace();
    let mut state = store.load().unwrap();
    let model = FakeModel::replying(INIT_RESPONSE);
    let err = run_refine_architect(&store, &mut state, "  \n", &model, &WorkflowOptions::default())
        .unwrap_err();
    assert!(matches!(err, ArchitectError::ValidationError(_)));
    assert!(model.calls.borrow().is_empty());
}

#[test]
fn transport_failure_persists_nothing() {
    let (_tmp, store) = workspace();
    let mut state = store.load().unwrap();
    let err = run_init_architect(
        &store,
        &mut state,
        "requirements",
        &FakeModel::failing("HTTP 500: upstream"),
        &WorkflowOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, ArchitectError::TransportError(ref m) if m.contains("500")));
    assert!(!store.state_path().exists());
    assert!(!store.log_dir().exists());
    assert!(state.is_initial());
}

#[test]
fn missing_prompt_fails_before_the_model_call() {
    let (_tmp, store) = workspace();
    fs::remove_file(store.prompt_dir().join(PROMPT_DSL_OUTPUT)).unwrap();
    let mut state = store.load().unwrap();
    let model = FakeModel::replying(INIT_RESPONSE);

    let err = run_init_architect(&store, &mut state, "req", &model, &WorkflowOptions::default())
        .unwrap_err();
    assert!(matches!(err, ArchitectError::ConfigError(ref m) if m.contains("architect init")));
    assert!(model.calls.borrow().is_empty());
}

#[test]
fn first_sync_asks_for_macro_modules_only() {
    let (tmp, store) = workspace();
    fs::create_dir_all(tmp.path().join("src")).unwrap();
    fs::write(tmp.path().join("src/lib.rs"), "pub fn invoice() {}").unwrap();
    let mut state = store.load().unwrap();
    let model = FakeModel::replying(INIT_RESPONSE);

    let code_summary = repomap::build_code_summary(tmp.path(), &[]);
    let request = SyncRequest {
        code_summary: &code_summary,
        user_prompt: None,
        macro_only: state.is_initial(),
    };
    let result =
        run_sync_code_to_architect(&store, &mut state, &request, &model, &WorkflowOptions::default())
            .unwrap();

    assert_eq!(result.applied.len(), 3);
    assert!(
        result
            .mutation_log_path
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("sync-")
    );
    let calls = model.calls.borrow();
    let last = calls[0].last().unwrap();
    assert!(last.content.contains("first sync"));
    assert!(calls[0].iter().any(|m| m.content.contains("File lib.rs preview:")));
}

#[test]
fn malformed_edit_is_reported_and_the_rest_applied() {
    let (_tmp, store) = workspace();
    let mut state = store.load().unwrap();
    let response = r#"<MutationPartial>
  <Module mutationType="Create" id="Good.module"><![CDATA[{ title: "Good" }]]></Module>
</MutationPartial>
<MutationPartial>
  <Module mutationType="Create" id="Bad.module"><![CDATA[{ title: require("fs") }]]></Module>
</MutationPartial>"#;

    let result = run_apply_response(&store, &mut state, response, &WorkflowOptions::default()).unwrap();
    assert_eq!(result.applied.len(), 1);
    assert_eq!(result.parse_errors.len(), 1);
    assert!(result.parse_errors[0].to_string().contains("Bad.module"));
    assert!(store.root.join("Good.module").is_file());
    assert!(!store.root.join("Bad.module").exists());
}

#[test]
fn apply_replays_a_logged_response() {
    let (_tmp, store) = workspace();
    let state = seeded(&store);
    let log_dir = store.log_dir();
    let logged = fs::read_dir(&log_dir).unwrap().next().unwrap().unwrap().path();

    let other = tempdir().unwrap();
    let other_store = Store::for_project(other.path());
    let mut replayed = other_store.load().unwrap();
    let raw = fs::read_to_string(&logged).unwrap();
    let result = run_apply_response(&other_store, &mut replayed, &raw, &WorkflowOptions::default()).unwrap();

    assert_eq!(result.applied.len(), 3);
    assert_eq!(replayed, state);
    assert!(
        result
            .mutation_log_path
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("apply-")
    );
}
