//! Engine, sequencer and capture behavior against the scripted driver.

mod common;

use common::{hidden, with_options, MockDriver, RecordingHook};
use std::sync::Arc;
use taxbot::{
    Engine, Error, ErrorKind, Locator, Params, Reporter, RunState, Sequencer, Status,
    WorkflowConfig,
};
use tokio_util::sync::CancellationToken;

const WORKFLOW: &str = r#"
name: "Engine test"
site: municipal
timeouts:
  step_ms: 2000
  poll_ms: 100
locators:
  dropdown:
    xpath: "//select"
  button:
    id: go
phases:
  simple:
    - report:
        message: "uno"
    - click:
        target: button
    - report:
        message: "tres"
  dropdown:
    - report:
        message: "esperando"
    - wait_for:
        target: dropdown
        state:
          populated: 2
    - select:
        target: dropdown
        index: 1
    - report:
        message: "seleccionado"
  popup:
    - expect_popup:
        trigger:
          click:
            target: button
    - report:
        message: "ventana nueva"
    - checkpoint:
        label: popup
  slow_load:
    - report:
        message: "antes"
    - goto:
        url: "https://example.com/slow"
    - wait_for_load:
        timeout_ms: 1500
    - report:
        message: "nunca"
"#;

fn config() -> WorkflowConfig {
    WorkflowConfig::parse(WORKFLOW).unwrap()
}

fn button() -> Locator {
    Locator::Id("go".into())
}

fn dropdown() -> Locator {
    Locator::Xpath("//select".into())
}

#[tokio::test(start_paused = true)]
async fn test_phase_runs_in_order() {
    let driver = MockDriver::new();
    let config = config();
    let mut engine = Engine::new(driver.clone(), Reporter::new(), &config);

    engine
        .run_phase(&config, "simple", &Params::new())
        .await
        .unwrap();
    let outcome = engine.finish(Ok(())).await;

    assert_eq!(outcome.status, Status::Success);
    assert_eq!(outcome.output, "uno\ntres");
    assert_eq!(outcome.error, "");
    assert_eq!(driver.calls(), vec!["click id=go", "close"]);
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_dropdown_to_populate() {
    let driver = MockDriver::new().probes(
        &dropdown(),
        vec![with_options(0), with_options(1), with_options(2)],
    );
    let config = config();
    let mut engine = Engine::new(driver.clone(), Reporter::new(), &config);

    engine
        .run_phase(&config, "dropdown", &Params::new())
        .await
        .unwrap();

    assert_eq!(engine.reporter().lines(), ["esperando", "seleccionado"]);
    assert!(driver
        .calls()
        .contains(&"select xpath=//select index 1".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_wait_timeout_names_the_step() {
    let driver = MockDriver::new().probes(&dropdown(), vec![with_options(1)]);
    let config = config();
    let mut engine = Engine::new(driver.clone(), Reporter::new(), &config);

    let err = engine
        .run_phase(&config, "dropdown", &Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    let message = err.to_string();
    assert!(message.starts_with("dropdown step 2 (wait_for"), "{}", message);
    assert!(message.contains("populated with 2+ children"), "{}", message);

    let outcome = engine.finish(Err(err)).await;
    assert_eq!(outcome.status, Status::Failed);
    assert_eq!(outcome.output, "esperando");
    assert!(!outcome.error.is_empty());
    assert_eq!(driver.close_count(), 1);
    assert!(!driver.calls().iter().any(|c| c.starts_with("select")));
}

#[tokio::test(start_paused = true)]
async fn test_missing_element_is_classified() {
    let driver = MockDriver::new().missing(&button());
    let config = config();
    let mut engine = Engine::new(driver.clone(), Reporter::new(), &config);

    let err = engine
        .run_phase(&config, "simple", &Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ElementNotFound);
    assert!(err.to_string().contains("simple step 2 (click id=go)"));
}

#[tokio::test(start_paused = true)]
async fn test_sequencer_resumes_at_failed_step() {
    let driver = MockDriver::new().missing(&button());
    let config = config();
    let mut engine = Engine::new(driver.clone(), Reporter::new(), &config);
    let steps = config.phase("simple", &Params::new()).unwrap();
    let mut sequencer = Sequencer::new("simple", steps);

    assert!(sequencer.run(&mut engine).await.is_err());
    assert_eq!(sequencer.position(), 1);

    driver.state().missing.clear();
    sequencer.run(&mut engine).await.unwrap();
    assert!(sequencer.is_done());
    assert_eq!(engine.reporter().lines(), ["uno", "tres"]);

    // Nothing left to do: a further run is a no-op.
    sequencer.run(&mut engine).await.unwrap();
    assert_eq!(engine.reporter().lines(), ["uno", "tres"]);
    assert_eq!(driver.calls(), vec!["click id=go"]);
}

#[tokio::test(start_paused = true)]
async fn test_popup_becomes_active_page() {
    let driver = MockDriver::new().popup_on(&button(), "https://example.com/popup");
    let hook = RecordingHook::default();
    let config = config();
    let mut engine = Engine::new(driver.clone(), Reporter::new(), &config)
        .with_checkpoints(Some(Arc::new(hook.clone())));

    engine
        .run_phase(&config, "popup", &Params::new())
        .await
        .unwrap();

    assert_eq!(driver.active_url(), "https://example.com/popup");
    let calls = driver.calls();
    let click = calls.iter().position(|c| c == "click id=go").unwrap();
    let switch = calls
        .iter()
        .position(|c| c == "switch_to https://example.com/popup")
        .unwrap();
    assert!(click < switch);
    assert_eq!(hook.labels(), vec!["popup"]);
}

#[tokio::test(start_paused = true)]
async fn test_popup_that_never_opens_times_out() {
    let driver = MockDriver::new();
    let config = config();
    let mut engine = Engine::new(driver.clone(), Reporter::new(), &config);

    let err = engine
        .run_phase(&config, "popup", &Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.to_string().contains("no new window"));
}

#[tokio::test(start_paused = true)]
async fn test_load_timeout_keeps_earlier_output() {
    let driver = MockDriver::new();
    driver.state().load_never_settles = true;
    let config = config();
    let mut engine = Engine::new(driver.clone(), Reporter::new(), &config);

    let result = engine.run_phase(&config, "slow_load", &Params::new()).await;
    let outcome = engine.finish(result).await;

    assert_eq!(outcome.status, Status::Failed);
    assert_eq!(outcome.output, "antes");
    assert!(outcome.error.contains("slow_load step 3 (wait_for_load)"));
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_before_next_step() {
    let driver = MockDriver::new();
    let token = CancellationToken::new();
    let config = config();
    let mut engine =
        Engine::new(driver.clone(), Reporter::new(), &config).with_cancellation(token.clone());
    token.cancel();

    let result = engine.run_phase(&config, "simple", &Params::new()).await;
    assert!(matches!(
        result,
        Err(Error::Step { ref source, .. }) if matches!(**source, Error::Cancelled)
    ));
    let outcome = engine.finish(result).await;
    assert_eq!(outcome.status, Status::Failed);
    assert_eq!(outcome.output, "");
    assert!(outcome.error.contains("run cancelled"));
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() {
    let driver = MockDriver::new();
    let config = config();
    let mut engine = Engine::new(driver.clone(), Reporter::new(), &config);

    engine.close().await.unwrap();
    engine.close().await.unwrap();
    assert_eq!(engine.state(), RunState::Closed(Status::Success));

    let outcome = engine.finish(Ok(())).await;
    assert!(outcome.is_success());
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_failure_fails_the_run() {
    let driver = MockDriver::new();
    driver.state().fail_close = true;
    let config = config();
    let mut engine = Engine::new(driver.clone(), Reporter::new(), &config);
    engine.report("hecho");

    let outcome = engine.finish(Ok(())).await;
    assert_eq!(outcome.status, Status::Failed);
    assert_eq!(outcome.output, "hecho");
    assert!(outcome.error.contains("error closing browser"));
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hidden_state_waits_for_dismissal() {
    let yaml = r#"
name: "Lookup"
site: revenue
timeouts:
  poll_ms: 100
phases:
  main:
    - wait_for:
        target:
          id: "0"
        state: hidden
        timeout_ms: 1000
"#;
    let config = WorkflowConfig::parse(yaml).unwrap();
    let choice = Locator::Id("0".into());
    let driver = MockDriver::new().probes(&choice, vec![common::visible(), hidden()]);
    let mut engine = Engine::new(driver, Reporter::new(), &config);

    engine
        .run_phase(&config, "main", &Params::new())
        .await
        .unwrap();
}
