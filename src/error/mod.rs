//! # 错误处理模块
//!
//! 过滤器统一的错误类型和上下文扩展

pub use types::ServiceControlError;

/// 全局统一的 Result 类型
pub type Result<T> = std::result::Result<T, ServiceControlError>;

pub mod types;

/// 为错误附加上下文
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<ServiceControlError>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display,
    {
        self.with_context(|| context)
    }

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(ServiceControlError::Context {
                context: context().to_string(),
                source: Box::new(error.into()),
            }),
        }
    }
}

#[cfg(test)]
mod tests;
