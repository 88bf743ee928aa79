use chrono::{DateTime, Utc};
use gantry_web::prelude::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ==================== 数据模型 ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Todo {
    id: u64,
    title: String,
    done: bool,
    owner: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
struct NewTodo {
    title: String,
}

// ==================== 服务层 ====================

#[derive(Default)]
struct TodoService {
    todos: RwLock<BTreeMap<u64, Todo>>,
    next_id: AtomicU64,
}

impl TodoService {
    fn list(&self, done: Option<bool>) -> Vec<Todo> {
        self.todos
            .read()
            .values()
            .filter(|todo| done.map_or(true, |done| todo.done == done))
            .cloned()
            .collect()
    }

    fn find(&self, id: u64) -> Option<Todo> {
        self.todos.read().get(&id).cloned()
    }

    fn create(&self, title: String, owner: Option<String>) -> Todo {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let todo = Todo {
            id,
            title,
            done: false,
            owner,
            created_at: Utc::now(),
        };
        self.todos.write().insert(id, todo.clone());
        todo
    }

    fn set_done(&self, id: u64, done: bool) -> Option<Todo> {
        let mut todos = self.todos.write();
        let todo = todos.get_mut(&id)?;
        todo.done = done;
        Some(todo.clone())
    }

    fn remove(&self, id: u64) -> Option<Todo> {
        self.todos.write().remove(&id)
    }
}

fn no_such_todo(id: u64) -> HttpActionError {
    HttpActionError::not_found(format!("No todo with id {id}"))
}

// ==================== 控制器 ====================

struct TodoController {
    service: Arc<TodoService>,
}

#[controller("/todos")]
impl TodoController {
    #[get_mapping]
    #[json]
    fn list(&self, #[request_param] done: Option<bool>) -> Vec<Todo> {
        self.service.list(done)
    }

    // 同级的参数路由按声明顺序匹配，带后缀的必须先于 /{id}
    #[get_mapping("/{id}.txt")]
    #[content_body]
    fn export(&self, #[path_param] id: u64) -> Result<String, HttpActionError> {
        let todo = self.service.find(id).ok_or_else(|| no_such_todo(id))?;
        let mark = if todo.done { "x" } else { " " };
        Ok(format!("[{mark}] {}", todo.title))
    }

    #[get_mapping("/{id}")]
    #[json]
    fn find(&self, #[path_param] id: u64) -> Result<Todo, HttpActionError> {
        self.service.find(id).ok_or_else(|| no_such_todo(id))
    }

    #[post_mapping]
    fn create(
        &self,
        #[json_body] todo: NewTodo,
        principal: Option<UserPrincipal>,
    ) -> Result<HttpResponse, HttpActionError> {
        if todo.title.trim().is_empty() {
            return Err(HttpActionError::bad_request("Title must not be empty"));
        }
        let owner = principal.map(|p| p.name().to_string());
        let todo = self.service.create(todo.title, owner);
        tracing::info!(id = todo.id, "Todo created");

        HttpResponse::created(format!("/todos/{}", todo.id))
            .json(&todo)
            .map_err(|e| HttpActionError::internal(e.to_string()))
    }

    #[post_mapping("/{id}?done")]
    #[json]
    fn complete(
        &self,
        #[path_param] id: u64,
        #[request_param] done: bool,
    ) -> Result<Todo, HttpActionError> {
        self.service.set_done(id, done).ok_or_else(|| no_such_todo(id))
    }

    #[delete_mapping("/{id}")]
    #[requires_role("admin")]
    fn delete(&self, #[path_param] id: u64) -> Result<HttpResponse, HttpActionError> {
        self.service.remove(id).ok_or_else(|| no_such_todo(id))?;
        Ok(HttpResponse::no_content())
    }
}

struct PageController;

#[controller]
impl PageController {
    #[get_mapping("/")]
    #[send_redirect]
    fn index(&self) -> String {
        "/todos".to_string()
    }

    #[get_mapping("/theme")]
    #[content_body]
    fn theme(
        &self,
        #[cookie_cell] theme: CookieCell,
        #[request_param] set: Option<String>,
    ) -> String {
        if let Some(value) = set {
            theme.set(value);
        }
        theme.get().unwrap_or_else(|| "light".to_string())
    }

    #[get_mapping("/whoami")]
    #[content_body]
    fn whoami(&self, principal: Option<UserPrincipal>, address: ClientAddress) -> String {
        let name = principal
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| "anonymous".to_string());
        match address.0 {
            Some(ip) => format!("{name} from {ip}"),
            None => name,
        }
    }
}

// ==================== 认证 ====================

/// 演示用认证：`X-User` 为用户名，`X-Roles` 为逗号分隔的角色
async fn authenticate(
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let user = req
        .headers()
        .get("x-user")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    if let Some(user) = user {
        let principal = req
            .headers()
            .get("x-roles")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .fold(UserPrincipal::new(user), |principal, role| principal.with_role(role));
        req.extensions_mut().insert(principal);
    }

    next.run(req).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_file = if Path::new("demos/todo-demo/application.toml").exists() {
        "demos/todo-demo/application.toml"
    } else {
        "application.toml"
    };

    let environment = Environment::load(config_file, "TODO_")?;
    LoggingConfig::from_environment(&environment)?.init()?;
    tracing::info!(sources = ?environment.source_names(), "Configuration loaded");

    let service = Arc::new(TodoService::default());
    let router = ActionRouter::builder()
        .controller(TodoController { service })
        .controller(PageController)
        .build()?;

    let properties = ServerProperties::from_environment(&environment)?;
    let server = GantryWebServer::new(properties, router);
    let app = server.app().layer(axum::middleware::from_fn(authenticate));

    server.run_with(app).await
}
