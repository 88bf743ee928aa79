//! Gantry Web Macros
//!
//! 提供 `#[controller]` 属性宏，把 impl 块中的路由方法声明为控制器动作

mod controller;
mod route;
mod utils;

use proc_macro::TokenStream;

/// 把 impl 块声明为控制器
///
/// 带 `#[get_mapping]` / `#[post_mapping]` / `#[put_mapping]` / `#[delete_mapping]` /
/// `#[patch_mapping]` 的方法成为动作，其余方法原样保留。可选参数是路径前缀。
///
/// 方法属性：
/// - `#[requires_role("admin")]`：要求登录用户具有该角色
/// - `#[json]` / `#[content_body]` / `#[content_body("text/html")]` / `#[send_redirect]`
/// - `#[returns_mapped_by(expr)]`：自定义返回值映射
///
/// 参数属性：
/// - `#[path_param]` / `#[request_param]` / `#[http_header]` / `#[cookie]` / `#[cookie_cell]`，
///   名称默认取参数名，也可以显式给出：`#[request_param("q")]`
/// - `#[json_body]` / `#[request_body]`
/// - `#[mapped_by(expr)]`：自定义参数映射
///
/// 没有属性的参数按类型从映射表中查找（如 `UserPrincipal`、`ClientAddress`）。
///
/// # 示例
///
/// ```ignore
/// #[controller("/users")]
/// impl UserController {
///     #[get_mapping("/{id}")]
///     #[json]
///     fn find(&self, #[path_param] id: u64) -> Result<User, HttpActionError> {
///         // ...
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn controller(attr: TokenStream, item: TokenStream) -> TokenStream {
    controller::controller_impl(attr, item)
}
