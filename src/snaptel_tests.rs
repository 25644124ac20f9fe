use super::*;
use crate::runner::CommandOutput;
use anyhow::Result;
use std::cell::RefCell;
use std::path::PathBuf;

const TASK_HEADER: &str = "ID NAME STATE HIT MISS FAIL CREATED LAST FAILURE";
const PLUGIN_HEADER: &str = "NAME VERSION TYPE SIGNED STATUS LOADED TIME";

/// Scripted snaptel: replays canned responses in order and records argv.
struct ScriptedRunner {
    responses: RefCell<Vec<CommandOutput>>,
    calls: RefCell<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    fn new(responses: Vec<CommandOutput>) -> Self {
        Self {
            responses: RefCell::new(responses),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
        }
    }

    fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            success: false,
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(argv.to_vec());
        let mut responses = self.responses.borrow_mut();
        assert!(!responses.is_empty(), "unexpected command: {argv:?}");
        Ok(responses.remove(0))
    }
}

fn snaptel(runner: &ScriptedRunner) -> Snaptel<&ScriptedRunner> {
    Snaptel::with_policy(
        runner,
        vec!["snaptel".to_string()],
        RetryPolicy::immediate(),
    )
}

fn plugin_listing(rows: &[(&str, &str)]) -> String {
    let mut listing = format!("{PLUGIN_HEADER}\n");
    for (name, status) in rows {
        listing.push_str(&format!("{name} 5 collector false {status} Tue\n"));
    }
    listing
}

#[test]
fn running_tasks_skip_header_and_blank_lines() {
    let listing = format!("{TASK_HEADER}\n720bautb-e6a5 task1 Running 5 0 0 Tue\n\n");
    let runner = ScriptedRunner::new(vec![ScriptedRunner::ok(&listing)]);

    let tasks = snaptel(&runner).list_running_tasks().expect("list tasks");

    assert_eq!(tasks, vec!["720bautb-e6a5"]);
    assert_eq!(runner.calls.borrow()[0], vec!["snaptel", "task", "list"]);
}

#[test]
fn empty_task_listing_yields_no_ids() {
    let runner = ScriptedRunner::new(vec![ScriptedRunner::ok(&format!("{TASK_HEADER}\n"))]);
    assert!(snaptel(&runner).list_running_tasks().expect("list").is_empty());
}

#[test]
fn task_listing_command_error_is_fatal() {
    let runner = ScriptedRunner::new(vec![ScriptedRunner::failed("connection refused")]);

    let err = snaptel(&runner).list_running_tasks().expect_err("must fail");

    assert!(err.to_string().contains("task list"));
    assert!(err.to_string().contains("connection refused"));
}

#[test]
fn loaded_plugins_exclude_transient_statuses() {
    let listing = plugin_listing(&[
        ("cpu-collector", "loaded"),
        ("mem-collector", "loading"),
        ("disk-collector", "loaded"),
        ("net-collector", "unloaded"),
    ]);
    let runner = ScriptedRunner::new(vec![ScriptedRunner::ok(&listing)]);

    let plugins = snaptel(&runner).list_loaded_plugins().expect("list plugins");

    assert_eq!(plugins, vec!["cpu-collector", "disk-collector"]);
}

#[test]
fn wait_succeeds_when_count_advances_by_one() {
    let runner = ScriptedRunner::new(vec![
        ScriptedRunner::ok(&plugin_listing(&[("cpu-collector", "loading")])),
        ScriptedRunner::ok(&plugin_listing(&[("cpu-collector", "loaded")])),
    ]);

    snaptel(&runner)
        .wait_until_plugin_loaded("cpu-collector", 0)
        .expect("wait for plugin");

    assert_eq!(runner.calls.borrow().len(), 2);
}

#[test]
fn wait_exhaustion_is_an_error() {
    let stuck = plugin_listing(&[("cpu-collector", "loading")]);
    let responses = (0..WAIT_RETRIES).map(|_| ScriptedRunner::ok(&stuck)).collect();
    let runner = ScriptedRunner::new(responses);

    let err = snaptel(&runner)
        .wait_until_plugin_loaded("cpu-collector", 0)
        .expect_err("exhaustion must fail");

    assert!(err.to_string().contains("cpu-collector"));
    assert_eq!(runner.calls.borrow().len(), WAIT_RETRIES as usize);
}

#[test]
fn load_plugin_confirms_count_increase() {
    let runner = ScriptedRunner::new(vec![
        // snapshot before the load
        ScriptedRunner::ok(&plugin_listing(&[("mem-collector", "loaded")])),
        // the load command itself
        ScriptedRunner::ok("Plugin loaded"),
        // confirmation poll: count went 1 -> 2
        ScriptedRunner::ok(&plugin_listing(&[
            ("mem-collector", "loaded"),
            ("cpu-collector", "loaded"),
        ])),
    ]);

    let loaded = snaptel(&runner)
        .load_plugin("cpu-collector", &PathBuf::from("/tmp/cpu.plugin"))
        .expect("load plugin");

    assert!(loaded);
    assert_eq!(
        runner.calls.borrow()[1],
        vec!["snaptel", "plugin", "load", "/tmp/cpu.plugin"]
    );
}

#[test]
fn load_plugin_retries_command_errors() {
    let empty = plugin_listing(&[]);
    let one = plugin_listing(&[("cpu-collector", "loaded")]);
    let runner = ScriptedRunner::new(vec![
        ScriptedRunner::ok(&empty),
        ScriptedRunner::failed("dial unix: connection refused"),
        ScriptedRunner::failed("dial unix: connection refused"),
        ScriptedRunner::ok("Plugin loaded"),
        ScriptedRunner::ok(&one),
    ]);

    let loaded = snaptel(&runner)
        .load_plugin("cpu-collector", &PathBuf::from("/tmp/cpu.plugin"))
        .expect("load plugin");

    assert!(loaded);
    let calls = runner.calls.borrow();
    let load_attempts = calls
        .iter()
        .filter(|argv| argv.get(1).map(String::as_str) == Some("plugin") && argv.get(2).map(String::as_str) == Some("load"))
        .count();
    assert_eq!(load_attempts, 3);
}

#[test]
fn load_plugin_reports_failure_after_budget_exhausted() {
    let mut responses = vec![ScriptedRunner::ok(&plugin_listing(&[]))];
    responses.extend((0..LOAD_RETRIES).map(|_| ScriptedRunner::failed("plugin not found")));
    let runner = ScriptedRunner::new(responses);

    let loaded = snaptel(&runner)
        .load_plugin("cpu-collector", &PathBuf::from("/tmp/cpu.plugin"))
        .expect("load plugin");

    assert!(!loaded);
    // snapshot listing + every load attempt, nothing more
    assert_eq!(runner.calls.borrow().len(), 1 + LOAD_RETRIES as usize);
}

#[test]
fn submit_task_does_not_retry() {
    let runner = ScriptedRunner::new(vec![ScriptedRunner::failed("invalid task manifest")]);

    let submitted = snaptel(&runner)
        .submit_task(&PathBuf::from("/tmp/task1.json"))
        .expect("submit task");

    assert!(!submitted);
    assert_eq!(runner.calls.borrow().len(), 1);
    assert_eq!(
        runner.calls.borrow()[0],
        vec!["snaptel", "task", "create", "-t", "/tmp/task1.json"]
    );
}

#[test]
fn submit_task_success_is_reported() {
    let runner = ScriptedRunner::new(vec![ScriptedRunner::ok("Task created")]);

    assert!(snaptel(&runner)
        .submit_task(&PathBuf::from("/tmp/task1.json"))
        .expect("submit task"));
}
