//! 核心宏定义

/// 为配置结构体实现 `Default`
///
/// 使用示例:
/// ```rust
/// struct MyConfig {
///     width: u32,
///     title: String,
/// }
///
/// lovejs::impl_default!(MyConfig {
///     width: 800,
///     title: String::from("LoveJS"),
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}
