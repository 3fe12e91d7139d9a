//! GitLab listing against a mock API server.

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use git_backup::{Error, GitLabConfig, GitLabSource, Repository, RepositorySource};

fn project(namespace: &str, name: &str) -> serde_json::Value {
    json!({
        "id": 7,
        "name": name,
        "name_with_namespace": format!("{} / {}", namespace, name),
        "path_with_namespace": format!("{}/{}", namespace.to_lowercase(), name.to_lowercase()),
        "http_url_to_repo": format!("https://gitlab.example.com/{}/{}.git", namespace, name),
    })
}

fn config(server: &MockServer) -> GitLabConfig {
    let mut config = GitLabConfig::with_token("glpat-test");
    config.url = Some(server.uri());
    config
}

fn names(repos: &[Repository]) -> Vec<String> {
    repos.iter().map(|r| r.full_name().to_string()).collect()
}

/// Every listing ends with an empty second page
async fn mount_empty_second_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

async fn mount_query(server: &MockServer, query: &str, projects: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param(query, "true"))
        .and(query_param("simple", "true"))
        .and(query_param("per_page", "100"))
        .and(query_param("page", "1"))
        .and(header("private-token", "glpat-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(projects))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_enabled_queries_are_unioned_without_duplicates() {
    let server = MockServer::start().await;
    mount_empty_second_page(&server).await;

    mount_query(&server, "starred", json!([project("Gnome", "gtk")])).await;
    mount_query(
        &server,
        "owned",
        json!([project("Alice", "tool"), project("Alice", "site")]),
    )
    .await;
    mount_query(
        &server,
        "membership",
        json!([project("Alice", "tool"), project("Team / Backend", "api")]),
    )
    .await;

    let repos = GitLabSource::new(&config(&server))
        .unwrap()
        .list_repositories()
        .await
        .unwrap();

    assert_eq!(
        names(&repos),
        vec!["Alice/site", "Alice/tool", "Gnome/gtk", "Team/Backend/api"]
    );
    assert_eq!(repos[0].git_url().username(), "git");
    assert_eq!(repos[0].git_url().password(), Some("glpat-test"));
}

#[tokio::test]
async fn test_disabled_queries_are_not_requested() {
    let server = MockServer::start().await;
    mount_empty_second_page(&server).await;

    mount_query(&server, "owned", json!([project("Alice", "tool")])).await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("starred", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.starred = false;
    config.member = false;

    let repos = GitLabSource::new(&config)
        .unwrap()
        .list_repositories()
        .await
        .unwrap();

    assert_eq!(names(&repos), vec!["Alice/tool"]);
}

#[tokio::test]
async fn test_pages_are_requested_until_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    for (page, name) in [("1", "one"), ("2", "two")] {
        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([project("Alice", name)])))
            .expect(1)
            .mount(&server)
            .await;
    }

    let mut config = config(&server);
    config.starred = false;
    config.member = false;

    let repos = GitLabSource::new(&config)
        .unwrap()
        .list_repositories()
        .await
        .unwrap();

    assert_eq!(names(&repos), vec!["Alice/one", "Alice/two"]);
}

#[tokio::test]
async fn test_exclusions_are_applied() {
    let server = MockServer::start().await;
    mount_empty_second_page(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            project("Alice", "tool"),
            project("Bob", "project"),
        ])))
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.exclude = vec!["bob".to_string()];

    let repos = GitLabSource::new(&config)
        .unwrap()
        .list_repositories()
        .await
        .unwrap();

    assert_eq!(names(&repos), vec!["Alice/tool"]);
}

#[tokio::test]
async fn test_page_failure_is_communication_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = GitLabSource::new(&config(&server))
        .unwrap()
        .list_repositories()
        .await;

    assert_matches!(result, Err(Error::Communication { job, .. }) if job == "GitLab");
}

#[tokio::test]
async fn test_identity_probe() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/user"))
        .and(header("private-token", "glpat-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "username": "alice"
        })))
        .mount(&server)
        .await;

    let login = GitLabSource::new(&config(&server)).unwrap().test().await.unwrap();
    assert_eq!(login, "alice");
}

#[tokio::test]
async fn test_rejected_token_is_authentication_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "401 Unauthorized"
        })))
        .mount(&server)
        .await;

    let result = GitLabSource::new(&config(&server)).unwrap().test().await;
    assert_matches!(result, Err(Error::Authentication { job, .. }) if job == "GitLab");
}
