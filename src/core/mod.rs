//! 核心编排层：错误类型、后台任务服务、应用门面、优雅关闭

pub mod application;
pub mod error;
pub mod shutdown;
pub mod task_service;

pub use application::{Application, ApplicationCleanup};
pub use error::{EngineError, StoreError};
pub use shutdown::{
    run_until_shutdown, ShutdownCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason,
};
pub use task_service::BackgroundTaskService;
