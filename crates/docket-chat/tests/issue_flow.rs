mod support;

use docket_chat::{
    ChatConfig, ConversationService, Dependencies, SessionError, build_issue_graph,
};
use docket_graph::{EngineConfig, EngineError, Message, Role, StepError};
use docket_store::MemoryCheckpointStore;
use std::sync::Arc;
use std::time::Duration;
use support::{
    FixedCatalogue, LineRenderer, MemoryResults, SequenceCompletion, StalledLawSearch, fixture,
    template,
};

fn service(deps: Arc<Dependencies>) -> ConversationService {
    ConversationService::new(
        build_issue_graph(deps).expect("issue graph should compile"),
        Arc::new(MemoryCheckpointStore::new()),
        EngineConfig::default(),
    )
}

#[tokio::test(flavor = "current_thread")]
async fn strict_template_path_expected_document_and_incremental_slices() {
    let fixture = fixture(vec![template(
        "labour",
        "Labour inspectorate complaint",
        &["employer", "date"],
    )]);
    let service = service(Arc::clone(&fixture.deps));
    let id = "42".to_string();
    let script = &fixture.completion;

    script.enqueue(r#"{"is_ready": 0, "user_message": "When were you dismissed?"}"#);
    let first = service
        .process_message(&id, "I was fired without notice")
        .await
        .expect("first message");
    assert_eq!(first.messages.len(), 3);
    assert_eq!(first.messages[2], Message::agent("When were you dismissed?"));
    assert!(!first.is_ended);

    script.enqueue(r#"{"is_ready": 1, "user_message": ""}"#);
    script.enqueue("dismissal without notice labour code");
    script.enqueue(r#"{"can_help": 1, "resume_for_user": "This looks unlawful. Continue?"}"#);
    let second = service
        .process_message(&id, "Last Monday, nothing in writing")
        .await
        .expect("second message");
    assert_eq!(second.messages.len(), 3);
    assert_eq!(
        second.messages[0],
        Message::user("Last Monday, nothing in writing")
    );
    assert!(second.messages[1].text.contains("Art. 81"));
    assert_eq!(
        second.messages[2],
        Message::agent("This looks unlawful. Continue?")
    );
    assert_eq!(
        fixture.law_search.queries.lock().expect("queries").clone(),
        vec!["dismissal without notice labour code".to_string()]
    );

    script.enqueue("1");
    script.enqueue(
        r#"{"relevant_template_index": 0, "user_message": "I found a labour inspectorate template. Continue?"}"#,
    );
    let third = service
        .process_message(&id, "yes please")
        .await
        .expect("third message");
    assert_eq!(
        third.messages,
        vec![
            Message::user("yes please"),
            Message::agent("I found a labour inspectorate template. Continue?"),
        ]
    );

    script.enqueue("1");
    script.enqueue(r#"{"user_message": "What is the employer's name?", "is_ready": false}"#);
    let fourth = service.process_message(&id, "ok").await.expect("fourth message");
    assert_eq!(fourth.messages.len(), 4);
    assert_eq!(fourth.messages[0], Message::user("ok"));
    assert_eq!(
        fourth.messages[1],
        Message::system("TEMPLATE Labour inspectorate complaint")
    );
    assert_eq!(fourth.messages[2].role, Role::System);
    assert_eq!(
        fourth.messages[3],
        Message::agent("What is the employer's name?")
    );

    script.enqueue(r#"{"user_message": "", "is_ready": true}"#);
    script.enqueue(r#"{"employer": "Acme Ltd", "date": "2024-03-04"}"#);
    let fifth = service
        .process_message(&id, "Acme Ltd")
        .await
        .expect("fifth message");
    assert!(fifth.is_ended);
    assert!(fifth.is_successful);
    assert_eq!(fifth.messages.len(), 2);
    assert_eq!(fifth.messages[0], Message::user("Acme Ltd"));
    assert_eq!(fifth.messages[1].role, Role::Agent);

    let document = fixture.results.document("42").expect("document stored");
    assert!(document.starts_with("Labour inspectorate complaint"));
    assert!(document.contains("employer=Acme Ltd"));

    let calls = fixture.completion.calls();
    assert_eq!(calls.len(), 10);
    assert!(calls[4].options.weak_model);
    assert_eq!(fixture.completion.remaining(), 0);

    let state = service.get_state(&id).await.expect("final state");
    let slices = first.messages.len()
        + second.messages.len()
        + third.messages.len()
        + fourth.messages.len()
        + fifth.messages.len();
    assert_eq!(state.messages.len(), slices);
    assert!(state.is_successful);
}

#[tokio::test(flavor = "current_thread")]
async fn no_fitting_template_expected_free_form_document() {
    let fixture = fixture(vec![template("tax", "Tax office appeal", &["office"])]);
    let service = service(Arc::clone(&fixture.deps));
    let id = "7".to_string();
    let script = &fixture.completion;

    script.enqueue(r#"{"is_ready": true, "user_message": ""}"#);
    script.enqueue("unpaid wages");
    script.enqueue(r#"{"can_help": true, "resume_for_user": "I can help. Continue?"}"#);
    service
        .process_message(&id, "My employer has not paid me for two months")
        .await
        .expect("first message");

    script.enqueue("1");
    script.enqueue(
        r#"{"relevant_template_index": -1, "user_message": "No template fits; I can write a free-form petition."}"#,
    );
    service
        .process_message(&id, "go ahead")
        .await
        .expect("second message");

    script.enqueue("1");
    script.enqueue(r#"{"user_message": "", "is_ready": true}"#);
    script.enqueue(r#"{"body": "Petition text", "authority": "Labour inspectorate"}"#);
    let last = service
        .process_message(&id, "sure")
        .await
        .expect("third message");

    assert!(last.is_ended);
    assert!(last.is_successful);
    let document = fixture.results.document("7").expect("document stored");
    assert!(document.starts_with("Free-form petition"));
    assert!(document.contains("body=Petition text"));
}

#[tokio::test(flavor = "current_thread")]
async fn declined_laws_confirmation_expected_unsuccessful_end() {
    let fixture = fixture(Vec::new());
    let service = service(Arc::clone(&fixture.deps));
    let id = "8".to_string();
    let script = &fixture.completion;

    script.enqueue(r#"{"is_ready": 1, "user_message": ""}"#);
    script.enqueue("query");
    script.enqueue(r#"{"can_help": 1, "resume_for_user": "Continue?"}"#);
    service
        .process_message(&id, "I was fined unfairly")
        .await
        .expect("first message");

    script.enqueue("0");
    let reply = service
        .process_message(&id, "no thanks")
        .await
        .expect("second message");

    assert!(reply.is_ended);
    assert!(!reply.is_successful);
    assert_eq!(reply.messages, vec![Message::user("no thanks")]);
    let error = service
        .process_message(&id, "wait")
        .await
        .expect_err("ended conversation rejects messages");
    assert!(matches!(error, SessionError::ConversationEnded { .. }));
}

#[tokio::test(flavor = "current_thread")]
async fn cannot_help_expected_end_without_confirmation() {
    let fixture = fixture(Vec::new());
    let service = service(Arc::clone(&fixture.deps));
    let id = "9".to_string();
    let script = &fixture.completion;

    script.enqueue(r#"{"is_ready": 1, "user_message": ""}"#);
    script.enqueue("query");
    script.enqueue(r#"{"can_help": 0, "resume_for_user": "There is no violation here."}"#);
    let reply = service
        .process_message(&id, "My neighbour is loud")
        .await
        .expect("first message");

    assert!(reply.is_ended);
    assert!(!reply.is_successful);
    assert_eq!(
        reply.messages.last(),
        Some(&Message::agent("There is no violation here."))
    );
}

#[tokio::test(flavor = "current_thread")]
async fn dependency_failure_expected_no_checkpoint_and_safe_retry() {
    let fixture = fixture(Vec::new());
    let service = service(Arc::clone(&fixture.deps));
    let id = "10".to_string();
    let script = &fixture.completion;

    let error = service
        .process_message(&id, "I was fired")
        .await
        .expect_err("missing completion reply should fail");
    assert!(matches!(
        error,
        SessionError::Engine(EngineError::Step {
            source: StepError::Dependency { .. },
            ..
        })
    ));
    assert!(!error.is_client_error());
    assert!(matches!(
        service.get_state(&id).await,
        Err(SessionError::NotFound { .. })
    ));

    script.enqueue(r#"{"is_ready": 0, "user_message": "When?"}"#);
    service
        .process_message(&id, "I was fired")
        .await
        .expect("retry should start the conversation");
    let before = service.get_state(&id).await.expect("state");

    let error = service
        .process_message(&id, "Monday")
        .await
        .expect_err("second call has no scripted reply");
    assert!(matches!(error, SessionError::Engine(_)));
    assert_eq!(service.get_state(&id).await.expect("state"), before);

    script.enqueue(r#"{"is_ready": 0, "user_message": "Which company?"}"#);
    let retried = service
        .process_message(&id, "Monday")
        .await
        .expect("retry should resume");
    assert_eq!(
        retried.messages,
        vec![Message::user("Monday"), Message::agent("Which company?")]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn malformed_completion_expected_invalid_output_error() {
    let fixture = fixture(Vec::new());
    let service = service(Arc::clone(&fixture.deps));
    fixture.completion.enqueue("Sure, tell me more!");

    let error = service
        .process_message(&"11".to_string(), "help")
        .await
        .expect_err("prose reply should be rejected");

    let SessionError::Engine(engine) = error else {
        panic!("expected engine error");
    };
    assert!(!engine.is_fatal());
    assert!(matches!(
        engine,
        EngineError::Step {
            source: StepError::InvalidOutput(_),
            ..
        }
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn stalled_law_search_expected_timeout_step_error() {
    let completion = SequenceCompletion::default();
    completion.enqueue(r#"{"is_ready": 1, "user_message": ""}"#);
    completion.enqueue("query");
    let deps = Arc::new(Dependencies::new(
        Arc::new(StalledLawSearch),
        Arc::new(FixedCatalogue {
            candidates: Vec::new(),
            free: template("free", "Free-form petition", &["body"]),
        }),
        Arc::new(LineRenderer),
        Arc::new(completion),
        Arc::new(MemoryResults::default()),
        &ChatConfig::default().with_dependency_timeout(Duration::from_millis(50)),
    ));
    let service = service(deps);

    let error = service
        .process_message(&"12".to_string(), "I was fired")
        .await
        .expect_err("stalled search should time out");

    assert!(matches!(
        error,
        SessionError::Engine(EngineError::Step {
            ref step,
            source: StepError::Timeout { ref dependency },
            ..
        }) if step == "find_law_documents" && dependency == "law_search"
    ));
}
