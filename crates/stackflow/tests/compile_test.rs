mod common;

use common::{TestProject, orchestrator};
use stackflow::{
    CancelToken, CompileError, CompileOptions, InMemoryRegistry, RecordingExecutor, Resource,
    compile, compile_file,
};
use stackflow_core::{StackError, ValidationError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SHOP: &str = r#"
name: shop
services:
  api:
    build: ./api
    image: registry.local/shop/api:1
    ports: [8080]
  web:
    image: nginx:1.27
    public: true
    ports: [80]
endpoints:
  main:
    - path: /api
      service: api
      port: 8080
    - path: /
      service: web
      port: 80
"#;

fn find<'a>(resources: &'a [Resource], kind: &str, name: &str) -> &'a Resource {
    resources
        .iter()
        .find(|r| r.kind() == kind && r.name() == name)
        .unwrap_or_else(|| panic!("{kind}/{name} not found"))
}

#[tokio::test]
async fn test_compile_reuses_existing_image() {
    let project = TestProject::new();
    let path = project.write_manifest(SHOP);
    let registry = Arc::new(InMemoryRegistry::new().with_image("registry.local/shop/api:1", "sha256:abc"));
    let executor = Arc::new(RecordingExecutor::new());
    let orchestrator = orchestrator(registry.clone(), executor.clone());

    let compiled = compile_file(&path, &CompileOptions::default(), &orchestrator, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(compiled.report.reused, vec!["api"]);
    assert!(compiled.report.built.is_empty());
    assert!(executor.requests().is_empty());
    assert_eq!(registry.lookups(), vec!["registry.local/shop/api:1"]);
    assert_eq!(compiled.stack.services["api"].image, "registry.local/shop/api:1");
    assert!(compiled.stack.services["api"].last_built_at.is_none());

    let kinds: Vec<_> = compiled.resources.iter().map(|r| (r.kind(), r.name())).collect();
    assert_eq!(
        kinds,
        vec![
            ("ConfigMap", "okteto-shop"),
            ("Deployment", "api"),
            ("Service", "api"),
            ("Deployment", "web"),
            ("Service", "web"),
            ("Ingress", "main"),
        ]
    );
}

#[tokio::test]
async fn test_compile_builds_missing_image() {
    let project = TestProject::new();
    let path = project.write_manifest(SHOP);
    let executor = Arc::new(RecordingExecutor::new());
    let orchestrator = orchestrator(Arc::new(InMemoryRegistry::new()), executor.clone());

    let compiled = compile_file(&path, &CompileOptions::default(), &orchestrator, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(compiled.report.built, vec!["api"]);
    let requests = executor.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].image, "registry.local/shop/api:1");
    assert_eq!(requests[0].context, project.root.path().join("api"));
    assert_eq!(requests[0].buildkit_host, "tcp://buildkit:1234");

    let Resource::Deployment(api) = find(&compiled.resources, "Deployment", "api") else {
        panic!("expected deployment");
    };
    assert!(api.metadata.annotations.contains_key("dev.okteto.com/last-built"));
}

#[tokio::test]
async fn test_compile_is_deterministic() {
    let project = TestProject::new();
    project.write_manifest(SHOP);
    let bytes = std::fs::read(project.manifest_path()).unwrap();

    let mut rendered = Vec::new();
    for _ in 0..2 {
        let registry =
            Arc::new(InMemoryRegistry::new().with_image("registry.local/shop/api:1", "sha256:abc"));
        let orchestrator = orchestrator(registry, Arc::new(RecordingExecutor::new()));
        let compiled = compile(
            &bytes,
            &project.manifest_path(),
            &CompileOptions::default(),
            &orchestrator,
            &CancelToken::new(),
        )
        .await
        .unwrap();
        rendered.push(compiled.render().unwrap());
    }

    assert_eq!(rendered[0], rendered[1]);
    assert!(rendered[0].contains("kind: Ingress"));
}

#[tokio::test]
async fn test_compile_cancelled_during_build() {
    let project = TestProject::new();
    let path = project.write_manifest(SHOP);
    let executor = Arc::new(RecordingExecutor::new().blocking());
    let orchestrator = orchestrator(Arc::new(InMemoryRegistry::new()), executor.clone());
    let cancel = CancelToken::new();

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    };
    let options = CompileOptions::default();
    let (result, _) = tokio::join!(
        compile_file(&path, &options, &orchestrator, &cancel),
        canceller
    );

    let err = result.unwrap_err();
    assert!(err.is_cancelled(), "{err:?}");
    assert_eq!(executor.requests().len(), 1);
}

#[tokio::test]
async fn test_compile_cancelled_before_start() {
    let project = TestProject::new();
    let path = project.write_manifest(SHOP);
    let registry = Arc::new(InMemoryRegistry::new());
    let orchestrator = orchestrator(registry.clone(), Arc::new(RecordingExecutor::new()));
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = compile_file(&path, &CompileOptions::default(), &orchestrator, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, CompileError::Cancelled));
    assert!(registry.lookups().is_empty());
}

#[tokio::test]
async fn test_compile_build_failure() {
    let project = TestProject::new();
    let path = project.write_manifest(SHOP);
    let executor =
        Arc::new(RecordingExecutor::new().fail_on("registry.local/shop/api:1", "exit status 1"));
    let orchestrator = orchestrator(Arc::new(InMemoryRegistry::new()), executor);

    let err = compile_file(&path, &CompileOptions::default(), &orchestrator, &CancelToken::new())
        .await
        .unwrap_err();

    assert!(!err.is_cancelled());
    assert!(matches!(err, CompileError::Build(_)), "{err:?}");
    assert!(err.to_string().contains("api"));
}

#[tokio::test]
async fn test_env_file_precedence() {
    let project = TestProject::new();
    project.write_file("a.env", "FOO=from-a\nONLY_A=a\n");
    project.write_file("b.env", "FOO=from-b\nBAR=from-b\n");
    let path = project.write_manifest(
        r#"
name: envs
services:
  app:
    image: busybox
    env_file: [a.env, b.env]
    environment:
      BAR: explicit
"#,
    );
    let orchestrator = orchestrator(
        Arc::new(InMemoryRegistry::new()),
        Arc::new(RecordingExecutor::new()),
    );

    let compiled = compile_file(&path, &CompileOptions::default(), &orchestrator, &CancelToken::new())
        .await
        .unwrap();

    let app = &compiled.stack.services["app"];
    assert_eq!(app.env("FOO"), Some("from-b"));
    assert_eq!(app.env("BAR"), Some("explicit"));
    assert_eq!(app.env("ONLY_A"), Some("a"));
    assert!(app.env_files.is_empty());

    let Resource::Deployment(deployment) = find(&compiled.resources, "Deployment", "app") else {
        panic!("expected deployment");
    };
    let names: Vec<_> = deployment.spec.template.spec.containers[0]
        .env
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, vec!["BAR", "FOO", "ONLY_A"]);
}

#[tokio::test]
async fn test_zero_storage_is_omitted() {
    let project = TestProject::new();
    let path = project.write_manifest(
        r#"
name: data
services:
  db:
    image: postgres:16
    volumes: [/var/lib/postgresql/data]
    resources:
      limits:
        memory: 512Mi
"#,
    );
    let orchestrator = orchestrator(
        Arc::new(InMemoryRegistry::new()),
        Arc::new(RecordingExecutor::new()),
    );

    let compiled = compile_file(&path, &CompileOptions::default(), &orchestrator, &CancelToken::new())
        .await
        .unwrap();

    let Resource::StatefulSet(db) = find(&compiled.resources, "StatefulSet", "db") else {
        panic!("expected stateful set");
    };
    assert!(db.spec.volume_claim_templates[0].spec.resources.is_empty());
    let limits = &db.spec.template.spec.containers[0].resources.limits;
    assert!(!limits.contains_key("storage"));
    assert_eq!(limits["memory"].as_str(), "512Mi");
    assert!(!compiled.render().unwrap().contains("storage"));
}

#[tokio::test]
async fn test_namespace_applied_to_every_resource() {
    let project = TestProject::new();
    let path = project.write_manifest(SHOP);
    let orchestrator = orchestrator(
        Arc::new(InMemoryRegistry::new().with_image("registry.local/shop/api:1", "sha256:abc")),
        Arc::new(RecordingExecutor::new()),
    );
    let options = CompileOptions {
        namespace: Some("team-a".to_string()),
        ..Default::default()
    };

    let compiled = compile_file(&path, &options, &orchestrator, &CancelToken::new())
        .await
        .unwrap();

    for resource in &compiled.resources {
        assert_eq!(resource.metadata().namespace.as_deref(), Some("team-a"));
    }
}

#[tokio::test]
async fn test_namespace_mismatch() {
    let project = TestProject::new();
    let path = project.write_manifest("name: app\nnamespace: team-a\nservices:\n  web:\n    image: nginx\n");
    let orchestrator = orchestrator(
        Arc::new(InMemoryRegistry::new()),
        Arc::new(RecordingExecutor::new()),
    );
    let options = CompileOptions {
        namespace: Some("team-b".to_string()),
        ..Default::default()
    };

    let err = compile_file(&path, &options, &orchestrator, &CancelToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CompileError::Validation(ValidationError::NamespaceMismatch { .. })
    ));
}

#[tokio::test]
async fn test_unknown_endpoint_service() {
    let project = TestProject::new();
    let path = project.write_manifest(
        r#"
name: app
services:
  web:
    image: nginx
    ports: [80]
endpoints:
  main:
    - path: /
      service: missing
      port: 80
"#,
    );
    let orchestrator = orchestrator(
        Arc::new(InMemoryRegistry::new()),
        Arc::new(RecordingExecutor::new()),
    );

    let err = compile_file(&path, &CompileOptions::default(), &orchestrator, &CancelToken::new())
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("main"), "{message}");
    assert!(message.contains("missing"), "{message}");
}

#[tokio::test]
async fn test_bind_mount_rejected() {
    let project = TestProject::new();
    let path = project.write_manifest("name: app\nservices:\n  db:\n    image: postgres\n    volumes: [\"data:/data\"]\n");
    let orchestrator = orchestrator(
        Arc::new(InMemoryRegistry::new()),
        Arc::new(RecordingExecutor::new()),
    );

    let err = compile_file(&path, &CompileOptions::default(), &orchestrator, &CancelToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CompileError::Validation(ValidationError::BindMount { .. })
    ));
}

#[tokio::test]
async fn test_missing_manifest() {
    let orchestrator = orchestrator(
        Arc::new(InMemoryRegistry::new()),
        Arc::new(RecordingExecutor::new()),
    );

    let err = compile_file(
        Path::new("/nonexistent/okteto-stack.yml"),
        &CompileOptions::default(),
        &orchestrator,
        &CancelToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CompileError::Stack(StackError::Io { .. })));
}
