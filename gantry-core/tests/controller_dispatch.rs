//! 通过 `#[controller]` 声明的控制器，端到端验证路由与分发

use bytes::Bytes;
use gantry_core::http::{header, Method, Request, StatusCode};
use gantry_core::prelude::*;
use gantry_core::{ClientRequest, ClientResponse, ConfigurationError, HttpClientError};
use gantry_web_macros::controller;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_test::traced_test;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct NewUser {
    name: String,
}

struct UserController;

#[controller("/users")]
impl UserController {
    #[get_mapping("/{id}")]
    #[json]
    fn find(&self, #[path_param] id: u64) -> Result<User, HttpActionError> {
        if id == 0 {
            return Err(HttpActionError::not_found("No user with id 0"));
        }
        Ok(User {
            id,
            name: format!("user-{id}"),
        })
    }

    #[get_mapping("/default")]
    #[content_body]
    fn default_user(&self) -> String {
        "default".to_string()
    }

    #[get_mapping("/{id}/agent")]
    #[content_body]
    fn agent(&self, #[path_param] id: u64, #[http_header] user_agent: Option<String>) -> String {
        format!("{id}:{}", user_agent.unwrap_or_else(|| "unknown".to_string()))
    }

    #[post_mapping]
    fn create(&self, #[json_body] user: NewUser) -> Result<HttpResponse, HttpActionError> {
        let user = User { id: 42, name: user.name };
        HttpResponse::created(format!("/users/{}", user.id))
            .json(&user)
            .map_err(|e| HttpActionError::internal(e.to_string()))
    }

    #[get_mapping("/fail")]
    #[content_body]
    fn fail(&self) -> gantry_core::anyhow::Result<String> {
        Err(anyhow!("database password rejected"))
    }

    #[get_mapping("/panic")]
    #[content_body]
    fn explode(&self) -> String {
        panic!("index out of range in user cache")
    }

    /// 普通方法保持不变
    fn helper(&self) -> u32 {
        7
    }
}

#[derive(Default)]
struct ItemController {
    created: Mutex<Vec<String>>,
}

#[controller]
impl ItemController {
    #[post_mapping("/items")]
    #[content_body]
    fn create(&self) -> String {
        self.created.lock().push("published".to_string());
        "published".to_string()
    }

    #[post_mapping("/items?draft")]
    #[content_body]
    fn create_draft(&self, #[request_param] draft: String) -> String {
        self.created.lock().push(format!("draft={draft}"));
        format!("draft={draft}")
    }
}

struct PathController;

#[controller("/path")]
impl PathController {
    #[get_mapping("/{a}/constant")]
    #[content_body]
    fn first(&self, #[path_param] a: String) -> String {
        format!("first a={a}")
    }

    #[get_mapping("/constant/{b}")]
    #[content_body]
    fn second(&self, #[path_param] b: String) -> String {
        format!("second b={b}")
    }

    #[get_mapping("/report/{id}.json")]
    #[content_body("application/json")]
    fn report(&self, #[path_param] id: u32) -> String {
        format!("{{\"report\":{id}}}")
    }
}

struct AdminController;

#[controller("/admin")]
impl AdminController {
    #[get_mapping("/stats")]
    #[requires_role("admin")]
    #[content_body]
    fn stats(&self, principal: UserPrincipal, #[request_param] verbose: bool) -> String {
        format!("stats for {} (verbose={verbose})", principal.name())
    }
}

struct SessionController;

#[controller]
impl SessionController {
    #[post_mapping("/login")]
    fn login(&self, #[cookie_cell("session")] session: CookieCell, #[request_param] user: String) {
        session.set(format!("token-{user}"));
    }

    #[post_mapping("/logout")]
    fn logout(&self, #[cookie_cell] session: CookieCell) {
        session.clear();
    }

    #[get_mapping("/whoami")]
    #[content_body]
    fn whoami(
        &self,
        address: ClientAddress,
        principal: Option<UserPrincipal>,
        #[cookie] session: Option<String>,
    ) -> String {
        let address = address.0.map(|ip| ip.to_string()).unwrap_or_default();
        let name = principal.map(|p| p.name().to_string()).unwrap_or_default();
        format!("{address}|{name}|{}", session.unwrap_or_default())
    }

    #[get_mapping("/home")]
    #[send_redirect]
    fn home(&self) -> String {
        "/users/default".to_string()
    }
}

struct ExportController;

#[controller]
impl ExportController {
    #[get_mapping("/export?csv")]
    #[content_body]
    fn csv(&self, #[request_param] csv: String) -> String {
        format!("csv={csv}")
    }

    #[get_mapping("/export?pdf")]
    #[content_body]
    fn pdf(&self, #[request_param] pdf: String) -> String {
        format!("pdf={pdf}")
    }

    #[post_mapping("/renew")]
    fn renew(&self, #[cookie_cell("session")] session: CookieCell) -> Result<(), HttpActionError> {
        session.set("token-renewed");
        Err(HttpActionError::bad_request("Session cannot be renewed"))
    }
}

struct AuditController;

#[controller("/audit")]
impl AuditController {
    #[get_mapping("/{id}/{revision}")]
    #[content_body]
    fn entry(&self, #[path_param] id: u64) -> String {
        format!("entry {id}")
    }
}

fn router() -> ActionRouter {
    ActionRouter::builder()
        .controller(UserController)
        .controller(ItemController::default())
        .controller(PathController)
        .controller(AdminController)
        .controller(SessionController)
        .controller(ExportController)
        .build()
        .unwrap()
}

fn send(router: &ActionRouter, method: Method, uri: &str) -> BufferedExchange {
    let mut exchange = BufferedExchange::request(method, uri);
    router.invoke(&mut exchange);
    exchange
}

#[test]
fn test_literal_route_beats_parameter() {
    let router = router();

    let exchange = send(&router, Method::GET, "/users/default");
    assert_eq!(exchange.response_status(), StatusCode::OK);
    assert_eq!(exchange.response_text(), "default");

    let exchange = send(&router, Method::GET, "/users/123");
    assert_eq!(exchange.response_status(), StatusCode::OK);
    let user: User = serde_json::from_slice(exchange.response_body()).unwrap();
    assert_eq!(
        user,
        User {
            id: 123,
            name: "user-123".to_string()
        }
    );
}

#[test]
fn test_required_query_param_selects_overload() {
    let controller = Arc::new(ItemController::default());
    let mut router = ActionRouter::new();
    router.register_controller(controller.clone()).unwrap();

    let exchange = send(&router, Method::POST, "/items");
    assert_eq!(exchange.response_text(), "published");

    let exchange = send(&router, Method::POST, "/items?draft=true");
    assert_eq!(exchange.response_text(), "draft=true");

    assert_eq!(
        *controller.created.lock(),
        vec!["published".to_string(), "draft=true".to_string()]
    );
}

#[test]
fn test_deeper_literal_wins() {
    let router = router();

    let exchange = send(&router, Method::GET, "/path/constant/constant");
    assert_eq!(exchange.response_text(), "second b=constant");

    let exchange = send(&router, Method::GET, "/path/other/constant");
    assert_eq!(exchange.response_text(), "first a=other");
}

#[test]
fn test_suffix_segment() {
    let router = router();

    let exchange = send(&router, Method::GET, "/path/report/42.json");
    assert_eq!(exchange.response_status(), StatusCode::OK);
    assert_eq!(exchange.response_header("content-type"), Some("application/json"));
    assert_eq!(exchange.response_text(), "{\"report\":42}");

    for uri in ["/path/report/42", "/path/report/42.xml"] {
        let exchange = send(&router, Method::GET, uri);
        assert_eq!(exchange.response_status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[test]
fn test_not_found_names_method_and_path() {
    let router = router();

    let exchange = send(&router, Method::GET, "/nowhere/at/all");
    assert_eq!(exchange.response_status(), StatusCode::NOT_FOUND);
    assert_eq!(exchange.response_text(), "MESSAGE: No action for GET /nowhere/at/all");

    let exchange = send(&router, Method::DELETE, "/users/1");
    assert_eq!(exchange.response_status(), StatusCode::NOT_FOUND);
    assert!(exchange.response_text().contains("DELETE /users/1"));
}

#[test]
fn test_action_error_keeps_status() {
    let router = router();
    let exchange = send(&router, Method::GET, "/users/0");
    assert_eq!(exchange.response_status(), StatusCode::NOT_FOUND);
    assert_eq!(exchange.response_text(), "MESSAGE: No user with id 0");
}

#[test]
#[traced_test]
fn test_method_failure_is_generic_500() {
    let router = router();

    let exchange = send(&router, Method::GET, "/users/fail");
    assert_eq!(exchange.response_status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(exchange.response_text(), "MESSAGE: Internal server error");
    assert!(!exchange.response_text().contains("password"));
    assert!(logs_contain("database password rejected"));
    logs_assert(|lines: &[&str]| {
        let errors = lines
            .iter()
            .filter(|line| line.contains("ERROR") && line.contains("database password rejected"))
            .count();
        match errors {
            1 => Ok(()),
            n => Err(format!("expected one ERROR line for the failure, found {n}")),
        }
    });
}

#[test]
#[traced_test]
fn test_panic_is_generic_500() {
    let router = router();

    let exchange = send(&router, Method::GET, "/users/panic");
    assert_eq!(exchange.response_status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!exchange.response_text().contains("user cache"));
    assert!(logs_contain("index out of range in user cache"));

    // 路由器在 panic 之后仍然可用
    let exchange = send(&router, Method::GET, "/users/7");
    assert_eq!(exchange.response_status(), StatusCode::OK);
}

#[test]
fn test_bad_path_parameter_is_400() {
    let router = router();
    let request = Request::builder()
        .uri("/users/abc")
        .header(header::ACCEPT, "application/json")
        .body(Bytes::new())
        .unwrap();
    let mut exchange = BufferedExchange::new(request);
    router.invoke(&mut exchange);

    assert_eq!(exchange.response_status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_slice(exchange.response_body()).unwrap();
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Invalid path parameter 'id'"), "{message}");
    assert!(message.contains("argument #0 of type u64 in UserController::find"), "{message}");
}

#[test]
fn test_header_default_name() {
    let router = router();
    let request = Request::builder()
        .uri("/users/5/agent")
        .header(header::USER_AGENT, "curl/8.0")
        .body(Bytes::new())
        .unwrap();
    let mut exchange = BufferedExchange::new(request);
    router.invoke(&mut exchange);
    assert_eq!(exchange.response_text(), "5:curl/8.0");

    let exchange = send(&router, Method::GET, "/users/default/agent");
    assert_eq!(exchange.response_status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_json_body_and_response_entity() {
    let router = router();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Bytes::from_static(b"{\"name\":\"carol\"}"))
        .unwrap();
    let mut exchange = BufferedExchange::new(request);
    router.invoke(&mut exchange);

    assert_eq!(exchange.response_status(), StatusCode::CREATED);
    assert_eq!(exchange.response_header("location"), Some("/users/42"));
    let user: User = serde_json::from_slice(exchange.response_body()).unwrap();
    assert_eq!(user.name, "carol");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/users")
        .body(Bytes::from_static(b"not json"))
        .unwrap();
    let mut exchange = BufferedExchange::new(request);
    router.invoke(&mut exchange);
    assert_eq!(exchange.response_status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_role_check() {
    let router = router();

    let exchange = send(&router, Method::GET, "/admin/stats");
    assert_eq!(exchange.response_status(), StatusCode::UNAUTHORIZED);

    // 角色检查先于参数绑定：缺少 verbose 参数也只报 403
    let mut exchange = BufferedExchange::request(Method::GET, "/admin/stats")
        .with_principal(UserPrincipal::new("bob"));
    router.invoke(&mut exchange);
    assert_eq!(exchange.response_status(), StatusCode::FORBIDDEN);
    assert_eq!(exchange.response_text(), "MESSAGE: User must have role 'admin'");

    let mut exchange = BufferedExchange::request(Method::GET, "/admin/stats?verbose=true")
        .with_principal(UserPrincipal::new("alice").with_role("admin"));
    router.invoke(&mut exchange);
    assert_eq!(exchange.response_status(), StatusCode::OK);
    assert_eq!(exchange.response_text(), "stats for alice (verbose=true)");
}

#[test]
fn test_cookie_cell_round_trip() {
    let router = router();

    let exchange = send(&router, Method::POST, "/login?user=dave");
    assert_eq!(exchange.response_status(), StatusCode::OK);
    assert_eq!(
        exchange.response_headers("set-cookie"),
        vec!["session=token-dave; Path=/; HttpOnly".to_string()]
    );

    let request = Request::builder()
        .method(Method::POST)
        .uri("/app/logout")
        .header(header::COOKIE, "session=token-dave")
        .body(Bytes::new())
        .unwrap();
    let mut exchange = BufferedExchange::new(request).with_context_path("/app");
    router.invoke(&mut exchange);
    assert_eq!(
        exchange.response_headers("set-cookie"),
        vec!["session=; Path=/app; Max-Age=0".to_string()]
    );
}

#[test]
fn test_several_query_overloads_are_ambiguous() {
    let router = router();

    let exchange = send(&router, Method::GET, "/export?csv=1");
    assert_eq!(exchange.response_text(), "csv=1");

    let exchange = send(&router, Method::GET, "/export?csv=1&pdf=2");
    assert_eq!(exchange.response_status(), StatusCode::BAD_REQUEST);
    assert!(
        exchange.response_text().starts_with("MESSAGE: More than one matching action"),
        "{}",
        exchange.response_text()
    );

    let exchange = send(&router, Method::GET, "/export");
    assert_eq!(exchange.response_status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_cookie_cell_not_written_when_method_fails() {
    let router = router();

    let exchange = send(&router, Method::POST, "/renew");
    assert_eq!(exchange.response_status(), StatusCode::BAD_REQUEST);
    assert_eq!(exchange.response_text(), "MESSAGE: Session cannot be renewed");
    assert!(exchange.response_headers("set-cookie").is_empty());
}

#[test]
#[traced_test]
fn test_unbound_path_parameter_only_warns() {
    let router = ActionRouter::builder()
        .controller(AuditController)
        .build()
        .unwrap();
    assert!(logs_contain("not bound to any argument"));

    let exchange = send(&router, Method::GET, "/audit/3/r7");
    assert_eq!(exchange.response_status(), StatusCode::OK);
    assert_eq!(exchange.response_text(), "entry 3");
}

#[test]
fn test_registry_defaults() {
    let router = router();
    let address: SocketAddr = "10.0.0.7:5000".parse().unwrap();
    let request = Request::builder()
        .uri("/whoami")
        .header(header::COOKIE, "session=abc")
        .body(Bytes::new())
        .unwrap();
    let mut exchange = BufferedExchange::new(request)
        .with_client_addr(address)
        .with_principal(UserPrincipal::new("erin"));
    router.invoke(&mut exchange);

    assert_eq!(exchange.response_text(), "10.0.0.7|erin|abc");

    let exchange = send(&router, Method::GET, "/whoami");
    assert_eq!(exchange.response_text(), "||");
}

#[test]
fn test_redirect_uses_context_path() {
    let router = router();
    let mut exchange =
        BufferedExchange::request(Method::GET, "/api/home").with_context_path("/api");
    router.invoke(&mut exchange);

    assert_eq!(exchange.response_status(), StatusCode::FOUND);
    assert_eq!(exchange.response_header("location"), Some("/api/users/default"));
}

#[test]
fn test_plain_methods_are_untouched() {
    assert_eq!(UserController.helper(), 7);
    assert_eq!(UserController.controller_name(), "UserController");
}

#[test]
fn test_introspection_lists_actions() {
    let router = router();
    let routes: Vec<String> = router.actions().iter().map(|a| a.to_string()).collect();
    assert!(routes.contains(&"GET /users/{id} -> UserController::find".to_string()));
    assert!(routes.contains(&"POST /items?draft -> ItemController::create_draft".to_string()));
}

#[test]
fn test_concurrent_dispatch() {
    let router = Arc::new(router());

    let handles: Vec<_> = (0..8_u64)
        .map(|worker| {
            let router = Arc::clone(&router);
            std::thread::spawn(move || {
                for i in 1..=50_u64 {
                    let id = worker * 1000 + i;
                    let exchange = send(&router, Method::GET, &format!("/users/{id}"));
                    let user: User = serde_json::from_slice(exchange.response_body()).unwrap();
                    assert_eq!(user.id, id);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_client_request_round_trip() {
    let router = router();

    let request = ClientRequest::new(Method::GET, "/users/{id}")
        .unwrap()
        .path_param("id", 9)
        .to_http_request("http://localhost")
        .unwrap();
    let mut exchange = BufferedExchange::new(request);
    router.invoke(&mut exchange);
    let user: User = ClientResponse::from(exchange.into_response()).json().unwrap();
    assert_eq!(user.id, 9);

    // 必需查询参数总是会被发送
    let request = ClientRequest::new(Method::POST, "/items?draft")
        .unwrap()
        .to_http_request("http://localhost")
        .unwrap();
    let mut exchange = BufferedExchange::new(request);
    router.invoke(&mut exchange);
    let text = ClientResponse::from(exchange.into_response()).text().unwrap();
    assert_eq!(text, "draft=");

    let request = ClientRequest::new(Method::GET, "/users/{id}")
        .unwrap()
        .path_param("id", 0)
        .header("Accept", "application/json")
        .to_http_request("http://localhost")
        .unwrap();
    let mut exchange = BufferedExchange::new(request);
    router.invoke(&mut exchange);
    match ClientResponse::from(exchange.into_response()).json::<User>() {
        Err(HttpClientError::Status { status, message }) => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(message, "No user with id 0");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

// ============================================================================
// 配置错误
// ============================================================================

struct Connection;

struct BrokenController;

#[controller("/broken")]
impl BrokenController {
    #[get_mapping("/{id}")]
    #[content_body]
    fn find(&self, #[path_param("user_id")] id: u64, _connection: Connection) -> String {
        id.to_string()
    }

    #[get_mapping("/all")]
    fn list(&self) -> Vec<u64> {
        Vec::new()
    }

    #[get_mapping("/by-key/{key}")]
    #[content_body]
    fn by_key(&self, #[path_param] key: String) -> String {
        key
    }

    #[get_mapping("/by-key/{other}")]
    #[content_body]
    fn by_other(&self, #[path_param] other: String) -> String {
        other
    }
}

#[test]
fn test_every_configuration_problem_is_reported() {
    let error = ActionRouter::builder()
        .controller(UserController)
        .controller(BrokenController)
        .build()
        .unwrap_err();

    assert_eq!(error.controllers.len(), 1);
    let broken = &error.controllers[0];
    assert_eq!(broken.controller, "BrokenController");
    assert_eq!(broken.errors.len(), 4, "{error}");

    assert!(broken.errors.iter().any(|e| matches!(
        e,
        ConfigurationError::UnknownPathParameter { name, .. } if name == "user_id"
    )));
    assert!(broken.errors.iter().any(|e| matches!(
        e,
        ConfigurationError::UnmappedParameter { index: 1, type_name, .. }
            if type_name.ends_with("Connection")
    )));
    assert!(broken.errors.iter().any(|e| matches!(
        e,
        ConfigurationError::UnmappedReturnType { action, .. } if action == "BrokenController::list"
    )));
    assert!(broken.errors.iter().any(|e| matches!(
        e,
        ConfigurationError::ConflictingRoute { action, .. }
            if action == "BrokenController::by_other"
    )));
}

#[test]
fn test_failed_controller_leaves_router_untouched() {
    let mut router = ActionRouter::new();
    router.register_controller(Arc::new(UserController)).unwrap();
    let before = router.actions().len();

    assert!(router.register_controller(Arc::new(BrokenController)).is_err());
    assert_eq!(router.actions().len(), before);

    let exchange = send(&router, Method::GET, "/broken/by-key/a");
    assert_eq!(exchange.response_status(), StatusCode::NOT_FOUND);
}
