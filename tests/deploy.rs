// ABOUTME: Integration tests for the deployment controller.
// ABOUTME: Drives the engine against in-memory fakes through full deploys.

mod support;

use guvnor::caddy::{Handler, KnownHandler};
use guvnor::engine::{CleanupArgs, DeployArgs, RunTaskArgs, StatusArgs};
use guvnor::error::Error;
use guvnor::state::{DeploymentStatus, StateStore};
use support::Harness;

const SIMPLE_SERVICE: &str = r#"
defaults:
  image: foo
  imageTag: bar

processes:
  web:
    quantity: 1
"#;

const BALANCED_SERVICE: &str = r#"
defaults:
  image: foo
  imageTag: bar

processes:
  web:
    quantity: 1
    caddy:
      hostnames:
        - web.example.com
"#;

fn backend_upstreams(handler: &Handler) -> Vec<String> {
    let Handler::Known(KnownHandler::ReverseProxy { upstreams }) = handler else {
        panic!("expected a reverse proxy handler");
    };
    upstreams.iter().map(|u| u.dial.clone()).collect()
}

#[tokio::test]
async fn first_deployment_creates_generation_one() {
    let h = Harness::with_service("svc", SIMPLE_SERVICE);

    let result = h.engine.deploy(DeployArgs::default()).await.unwrap();
    assert_eq!(result.service_name, "svc");
    assert_eq!(result.deployment_id, 1);

    let state = h.store.load("svc").unwrap();
    assert_eq!(state.deployment_id, 1);
    assert_eq!(state.deployment_status, Some(DeploymentStatus::Success));
    assert!(state.last_deployed_at.is_some());

    let container = h.runtime.container_named("svc-web-1-0").expect("replica exists");
    assert!(container.running);
    assert_eq!(container.config.image, "foo:bar");

    let labels = &container.config.labels;
    assert_eq!(labels.get("io.k.guvnor.managed").unwrap(), "1");
    assert_eq!(labels.get("io.k.guvnor.service").unwrap(), "svc");
    assert_eq!(labels.get("io.k.guvnor.process").unwrap(), "web");
    assert_eq!(labels.get("io.k.guvnor.deployment").unwrap(), "1");
    let port: u16 = labels.get("io.k.guvnor.port").unwrap().parse().unwrap();
    assert_ne!(port, 0);

    assert_eq!(
        container.config.env.get("GUVNOR_DEPLOYMENT").unwrap(),
        "1"
    );

    // No hostnames configured, so the load balancer was never touched.
    assert_eq!(h.admin.route_patches(), 0);
    // The caddy bootstrap wrote its baseline config exactly once.
    assert_eq!(h.admin.config_posts(), 1);
    assert!(h.runtime.container_named("guvnor-caddy").is_some());
}

#[tokio::test]
async fn deployment_ids_increase_on_success_and_failure() {
    let failing = r#"
defaults:
  image: foo
  imageTag: bar

processes:
  web:
    readyCheck:
      frequency: 10ms
      maximum: 2
      http:
        path: /healthz
"#;
    let h = Harness::with_service("svc", failing);

    // Nothing listens on the replica's port, so the ready check exhausts
    // its budget and the deployment fails.
    let err = h.engine.deploy(DeployArgs::default()).await.unwrap_err();
    assert!(err.to_string().contains("exhausted retry count"));

    let state = h.store.load("svc").unwrap();
    assert_eq!(state.deployment_id, 1);
    assert_eq!(state.deployment_status, Some(DeploymentStatus::Failure));

    h.rewrite_service("svc", SIMPLE_SERVICE);
    h.engine.deploy(DeployArgs::default()).await.unwrap();

    let state = h.store.load("svc").unwrap();
    assert_eq!(state.deployment_id, 2);
    assert_eq!(state.deployment_status, Some(DeploymentStatus::Success));
}

#[tokio::test]
async fn env_layers_merge_with_engine_injected_values_on_top() {
    let yaml = r#"
defaults:
  image: foo
  imageTag: bar
  env:
    A: d
    B: d

processes:
  web:
    env:
      A: p
"#;
    let h = Harness::with_service("svc", yaml);
    h.engine.deploy(DeployArgs::default()).await.unwrap();

    let container = h.runtime.container_named("svc-web-1-0").unwrap();
    let env = &container.config.env;

    assert_eq!(env.get("A").unwrap(), "p");
    assert_eq!(env.get("B").unwrap(), "d");
    assert_eq!(env.get("GUVNOR_SERVICE").unwrap(), "svc");
    assert_eq!(env.get("GUVNOR_PROCESS").unwrap(), "web");
    assert_eq!(env.get("GUVNOR_DEPLOYMENT").unwrap(), "1");
    assert_eq!(
        env.get("PORT").unwrap(),
        container.config.labels.get("io.k.guvnor.port").unwrap()
    );
    assert_eq!(env.len(), 6);
}

#[tokio::test]
async fn rolling_deployment_replaces_the_previous_generation() {
    let h = Harness::with_service("svc", BALANCED_SERVICE);

    h.engine.deploy(DeployArgs::default()).await.unwrap();
    let first = h.runtime.container_named("svc-web-1-0").unwrap();
    let first_port = first.config.labels.get("io.k.guvnor.port").unwrap().clone();

    let routes = h.admin.routes();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].group, "svc-web");
    assert_eq!(
        backend_upstreams(&routes[0].handlers[0]),
        vec![format!("localhost:{}", first_port)]
    );

    let result = h
        .engine
        .deploy(DeployArgs {
            service_name: None,
            tag: Some("v2".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(result.deployment_id, 2);

    let second = h.runtime.container_named("svc-web-2-0").unwrap();
    assert!(second.running);
    assert_eq!(second.config.image, "foo:v2");

    // The old replica was told to terminate after its replacement landed.
    assert!(
        h.runtime
            .killed()
            .contains(&("svc-web-1-0".to_string(), "SIGTERM".to_string()))
    );
    let first = h.runtime.container_named("svc-web-1-0").unwrap();
    assert!(!first.running);

    // The backend now only routes to the new generation.
    let second_port = second.config.labels.get("io.k.guvnor.port").unwrap().clone();
    let routes = h.admin.routes();
    assert_eq!(routes.len(), 1);
    assert_eq!(
        backend_upstreams(&routes[0].handlers[0]),
        vec![format!("localhost:{}", second_port)]
    );
}

#[tokio::test]
async fn shrinking_quantity_retires_surplus_replicas() {
    let two_replicas = r#"
defaults:
  image: foo
  imageTag: bar

processes:
  web:
    quantity: 2
    caddy:
      hostnames:
        - web.example.com
"#;
    let h = Harness::with_service("svc", two_replicas);
    h.engine.deploy(DeployArgs::default()).await.unwrap();
    assert!(h.runtime.container_named("svc-web-1-0").is_some());
    assert!(h.runtime.container_named("svc-web-1-1").is_some());

    h.rewrite_service("svc", BALANCED_SERVICE);
    h.engine.deploy(DeployArgs::default()).await.unwrap();

    // One new replica; both old replicas were signalled.
    let current: Vec<_> = h
        .runtime
        .containers()
        .into_iter()
        .filter(|c| {
            c.config.labels.get("io.k.guvnor.deployment").map(String::as_str) == Some("2")
        })
        .collect();
    assert_eq!(current.len(), 1);

    let killed = h.runtime.killed();
    assert!(killed.contains(&("svc-web-1-0".to_string(), "SIGTERM".to_string())));
    assert!(killed.contains(&("svc-web-1-1".to_string(), "SIGTERM".to_string())));

    // The LB only routes to the surviving replica.
    let port = current[0].config.labels.get("io.k.guvnor.port").unwrap();
    let routes = h.admin.routes();
    assert_eq!(
        backend_upstreams(&routes[0].handlers[0]),
        vec![format!("localhost:{}", port)]
    );

    // Cleanup sweeps the old generation away entirely.
    h.engine.cleanup(CleanupArgs::default()).await.unwrap();
    let deployments: Vec<_> = h
        .runtime
        .containers()
        .into_iter()
        .filter_map(|c| c.config.labels.get("io.k.guvnor.deployment").cloned())
        .collect();
    assert_eq!(deployments, vec!["2".to_string()]);

    // The managed caddy container is not a process container and survives.
    assert!(h.runtime.container_named("guvnor-caddy").is_some());
}

#[tokio::test]
async fn replace_strategy_stops_old_replicas_before_starting_new_ones() {
    let yaml = r#"
defaults:
  image: foo
  imageTag: bar

processes:
  web:
    quantity: 2
    deploymentStrategy: replace
    caddy:
      hostnames:
        - web.example.com
"#;
    let h = Harness::with_service("svc", yaml);
    h.engine.deploy(DeployArgs::default()).await.unwrap();
    h.engine.deploy(DeployArgs::default()).await.unwrap();

    // Old replicas are stopped gracefully, not signalled.
    assert_eq!(
        h.runtime.stopped(),
        vec!["svc-web-1-0".to_string(), "svc-web-1-1".to_string()]
    );
    assert!(h.runtime.killed().is_empty());

    let new_0 = h.runtime.container_named("svc-web-2-0").unwrap();
    let new_1 = h.runtime.container_named("svc-web-2-1").unwrap();
    assert!(new_0.running && new_1.running);

    let routes = h.admin.routes();
    assert_eq!(
        backend_upstreams(&routes[0].handlers[0]),
        vec![
            format!(
                "localhost:{}",
                new_0.config.labels.get("io.k.guvnor.port").unwrap()
            ),
            format!(
                "localhost:{}",
                new_1.config.labels.get("io.k.guvnor.port").unwrap()
            ),
        ]
    );
}

#[tokio::test]
async fn callbacks_run_as_tasks_with_injected_environment() {
    let yaml = r#"
defaults:
  image: foo
  imageTag: bar

processes:
  web:
    quantity: 1

tasks:
  migrate:
    command: ["bin/migrate"]

callbacks:
  preDeployment: [migrate]
  postDeployment: [migrate]
"#;
    let h = Harness::with_service("svc", yaml);
    h.engine.deploy(DeployArgs::default()).await.unwrap();

    // Task containers are removed once they finish; find them in the
    // removal record.
    let task_runs: Vec<_> = h
        .runtime
        .removed()
        .into_iter()
        .filter(|c| c.name.starts_with("svc-task-migrate-"))
        .collect();
    assert_eq!(task_runs.len(), 2);

    let callbacks: Vec<_> = task_runs
        .iter()
        .map(|c| c.config.env.get("GUVNOR_CALLBACK").unwrap().clone())
        .collect();
    assert_eq!(
        callbacks,
        vec!["PRE_DEPLOYMENT".to_string(), "POST_DEPLOYMENT".to_string()]
    );

    for run in &task_runs {
        assert_eq!(run.config.env.get("GUVNOR_DEPLOYMENT").unwrap(), "1");
        assert_eq!(run.config.env.get("GUVNOR_TASK").unwrap(), "migrate");
        assert_eq!(run.config.env.get("GUVNOR_SERVICE").unwrap(), "svc");
        assert_eq!(
            run.config.labels.get("io.k.guvnor.task").unwrap(),
            "migrate"
        );
        assert_eq!(run.config.command.as_deref(), Some(&["bin/migrate".to_string()][..]));
    }
}

#[tokio::test]
async fn run_task_executes_and_removes_the_container() {
    let yaml = r#"
defaults:
  image: foo
  imageTag: bar

tasks:
  report:
    command: ["bin/report"]
"#;
    let h = Harness::with_service("svc", yaml);

    h.engine
        .run_task(RunTaskArgs {
            service_name: None,
            task_name: "report".to_string(),
        })
        .await
        .unwrap();

    let removed = h.runtime.removed();
    assert_eq!(removed.len(), 1);
    assert!(removed[0].name.starts_with("svc-task-report-"));
    assert_eq!(
        removed[0].config.labels.get("io.k.guvnor.task").unwrap(),
        "report"
    );
    // No replica labels on task containers.
    assert!(!removed[0].config.labels.contains_key("io.k.guvnor.process"));
    assert!(h.runtime.containers().is_empty());
}

#[tokio::test]
async fn run_task_rejects_unknown_tasks() {
    let h = Harness::with_service("svc", SIMPLE_SERVICE);

    let err = h
        .engine
        .run_task(RunTaskArgs {
            service_name: None,
            task_name: "nope".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TaskNotFound(name) if name == "nope"));
}

#[tokio::test]
async fn status_buckets_containers_by_process() {
    let h = Harness::with_service("svc", SIMPLE_SERVICE);
    h.engine.deploy(DeployArgs::default()).await.unwrap();

    let status = h.engine.status(StatusArgs::default()).await.unwrap();
    assert_eq!(status.deployment_id, 1);
    assert_eq!(status.deployment_status, Some(DeploymentStatus::Success));

    let web = status.processes.get("web").unwrap();
    assert_eq!(web.want_replicas, 1);
    assert_eq!(web.containers.len(), 1);
    assert_eq!(web.containers[0].name, "svc-web-1-0");
    assert_eq!(web.containers[0].state, "running");
}

#[tokio::test]
async fn purge_removes_all_managed_containers_and_state() {
    let h = Harness::with_service("svc", BALANCED_SERVICE);
    h.engine.deploy(DeployArgs::default()).await.unwrap();
    assert!(!h.runtime.containers().is_empty());

    h.engine.purge().await.unwrap();

    assert!(h.runtime.containers().is_empty());
    let state = h.store.load("svc").unwrap();
    assert_eq!(state.deployment_id, 0);
    assert!(state.deployment_status.is_none());
}
