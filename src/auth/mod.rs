// 凭证模块
//
// OAuth 授权流程本身由外部工具完成，这里只负责加载和校验
// 已落盘的访问令牌，并以注入方式交给远端客户端使用。

pub mod types;

pub use types::Credential;
