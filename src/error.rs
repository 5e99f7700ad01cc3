// 错误类型定义

/// 备份流程错误分类
///
/// 分类决定传播方式：配置与凭证错误立即中止所属操作，
/// 瞬态错误由重试策略消化，终态错误只影响单个任务。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupError {
    /// 过滤条件无效（在发起任何远端请求之前检出）
    Config(String),
    /// 凭证缺失、无效或已过期
    Auth(String),
    /// 瞬态传输错误（网络/超时/服务端 5xx），可重试
    Transient(String),
    /// 重试预算耗尽后的终态失败
    Terminal { attempts: u32, last_error: String },
    /// 本地 IO 错误
    Io(String),
    /// 远端响应解析错误
    Parse(String),
    /// 其他错误
    Other(String),
}

impl BackupError {
    /// 是否属于可自动重试的瞬态错误
    pub fn is_transient(&self) -> bool {
        matches!(self, BackupError::Transient(_))
    }
}

impl std::fmt::Display for BackupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupError::Config(msg) => write!(f, "配置无效: {}", msg),
            BackupError::Auth(msg) => write!(f, "凭证错误: {}", msg),
            BackupError::Transient(msg) => write!(f, "瞬态传输错误: {}", msg),
            BackupError::Terminal {
                attempts,
                last_error,
            } => {
                write!(f, "重试 {} 次后仍失败: {}", attempts, last_error)
            }
            BackupError::Io(msg) => write!(f, "IO 错误: {}", msg),
            BackupError::Parse(msg) => write!(f, "解析错误: {}", msg),
            BackupError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for BackupError {}

impl From<std::io::Error> for BackupError {
    fn from(e: std::io::Error) -> Self {
        BackupError::Io(e.to_string())
    }
}

impl From<reqwest::Error> for BackupError {
    fn from(e: reqwest::Error) -> Self {
        // 超时与连接失败视为瞬态；服务端 5xx 同样可重试
        if e.is_timeout() || e.is_connect() {
            return BackupError::Transient(e.to_string());
        }
        if let Some(status) = e.status() {
            if status.is_server_error() {
                return BackupError::Transient(e.to_string());
            }
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return BackupError::Auth(e.to_string());
            }
        }
        if e.is_decode() {
            return BackupError::Parse(e.to_string());
        }
        BackupError::Other(e.to_string())
    }
}

pub type BackupResult<T> = Result<T, BackupError>;
