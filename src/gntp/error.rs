//! 服务端错误域 - Error-Code 及其规范描述

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Headers;

/// `-ERROR` 响应的 Error-Code 值, 开放整数域
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const TIMED_OUT: ErrorCode = ErrorCode(200);
    pub const NETWORK_FAILURE: ErrorCode = ErrorCode(201);
    pub const INVALID_REQUEST: ErrorCode = ErrorCode(300);
    pub const UNKNOWN_PROTOCOL: ErrorCode = ErrorCode(301);
    pub const UNKNOWN_PROTOCOL_VERSION: ErrorCode = ErrorCode(302);
    pub const REQUIRED_HEADER_MISSING: ErrorCode = ErrorCode(303);
    pub const NOT_AUTHORIZED: ErrorCode = ErrorCode(400);
    pub const UNKNOWN_APPLICATION: ErrorCode = ErrorCode(401);
    pub const UNKNOWN_NOTIFICATION: ErrorCode = ErrorCode(402);
    pub const ALREADY_PROCESSED: ErrorCode = ErrorCode(403);
    pub const NOTIFICATION_DISABLED: ErrorCode = ErrorCode(404);
    pub const INTERNAL_SERVER_ERROR: ErrorCode = ErrorCode(500);

    /// 规范描述; 未知代码返回空串
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::TIMED_OUT => "Timed Out",
            ErrorCode::NETWORK_FAILURE => "Network Failure",
            ErrorCode::INVALID_REQUEST => "Invalid Request",
            ErrorCode::UNKNOWN_PROTOCOL => "Unknown Protocol",
            ErrorCode::UNKNOWN_PROTOCOL_VERSION => "Unknown Protocol Version",
            ErrorCode::REQUIRED_HEADER_MISSING => "Required Header Missing",
            ErrorCode::NOT_AUTHORIZED => "Not Authorized",
            ErrorCode::UNKNOWN_APPLICATION => "Unknown Application",
            ErrorCode::UNKNOWN_NOTIFICATION => "Unknown Notification",
            ErrorCode::ALREADY_PROCESSED => "Already Processed",
            ErrorCode::NOTIFICATION_DISABLED => "Notification Disabled",
            ErrorCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 服务端报告的应用级错误
///
/// `description` 来自服务端, 可以覆盖规范文案; 其余头进入扩展映射。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub code: ErrorCode,
    pub description: String,
    pub header: Headers,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            f.write_str(self.code.description())
        } else {
            f.write_str(&self.description)
        }
    }
}

impl std::error::Error for ServerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_descriptions() {
        assert_eq!(ErrorCode::TIMED_OUT.description(), "Timed Out");
        assert_eq!(
            ErrorCode::INTERNAL_SERVER_ERROR.description(),
            "Internal Server Error"
        );
        // 开放整数域: 未知代码不报错, 描述为空
        assert_eq!(ErrorCode(100).description(), "");
    }

    #[test]
    fn test_server_description_overrides() {
        let err = ServerError {
            code: ErrorCode(100),
            description: "Description".into(),
            header: Headers::new(),
        };
        assert_eq!(err.to_string(), "Description");

        let err = ServerError {
            code: ErrorCode::INTERNAL_SERVER_ERROR,
            description: String::new(),
            header: Headers::new(),
        };
        assert_eq!(err.to_string(), "Internal Server Error");
    }
}
