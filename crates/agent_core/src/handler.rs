use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::AgentError;
use crate::frame::error_code;
use crate::transport::{BoxFuture, RequestHandler};

/// The small, enumerated set of server-to-client request methods a client
/// can answer. Method names are illustrative placeholders for the real
/// per-deployment method catalogue, which is out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalMethod {
    PatchApproval,
    CommandExecutionApproval,
    FileChangeApproval,
    DynamicToolCall,
    ToolUserInput,
    AuthTokenRefresh,
    FuzzyFileSearch,
}

impl ApprovalMethod {
    pub const ALL: [ApprovalMethod; 7] = [
        ApprovalMethod::PatchApproval,
        ApprovalMethod::CommandExecutionApproval,
        ApprovalMethod::FileChangeApproval,
        ApprovalMethod::DynamicToolCall,
        ApprovalMethod::ToolUserInput,
        ApprovalMethod::AuthTokenRefresh,
        ApprovalMethod::FuzzyFileSearch,
    ];

    pub fn method_name(self) -> &'static str {
        match self {
            ApprovalMethod::PatchApproval => "patch/approval",
            ApprovalMethod::CommandExecutionApproval => "command/approval",
            ApprovalMethod::FileChangeApproval => "file_change/approval",
            ApprovalMethod::DynamicToolCall => "tool/call",
            ApprovalMethod::ToolUserInput => "tool/input",
            ApprovalMethod::AuthTokenRefresh => "auth/refresh",
            ApprovalMethod::FuzzyFileSearch => "fs/fuzzy_search",
        }
    }

    pub fn from_method_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.method_name() == name)
    }
}

#[derive(Default, Clone)]
struct ApprovalBundleInner {
    patch_approval: Option<RequestHandler>,
    command_execution_approval: Option<RequestHandler>,
    file_change_approval: Option<RequestHandler>,
    dynamic_tool_call: Option<RequestHandler>,
    tool_user_input: Option<RequestHandler>,
    auth_token_refresh: Option<RequestHandler>,
    fuzzy_file_search: Option<RequestHandler>,
}

impl ApprovalBundleInner {
    fn get(&self, method: ApprovalMethod) -> Option<RequestHandler> {
        match method {
            ApprovalMethod::PatchApproval => self.patch_approval.clone(),
            ApprovalMethod::CommandExecutionApproval => self.command_execution_approval.clone(),
            ApprovalMethod::FileChangeApproval => self.file_change_approval.clone(),
            ApprovalMethod::DynamicToolCall => self.dynamic_tool_call.clone(),
            ApprovalMethod::ToolUserInput => self.tool_user_input.clone(),
            ApprovalMethod::AuthTokenRefresh => self.auth_token_refresh.clone(),
            ApprovalMethod::FuzzyFileSearch => self.fuzzy_file_search.clone(),
        }
    }

    fn set(&mut self, method: ApprovalMethod, handler: Option<RequestHandler>) {
        match method {
            ApprovalMethod::PatchApproval => self.patch_approval = handler,
            ApprovalMethod::CommandExecutionApproval => self.command_execution_approval = handler,
            ApprovalMethod::FileChangeApproval => self.file_change_approval = handler,
            ApprovalMethod::DynamicToolCall => self.dynamic_tool_call = handler,
            ApprovalMethod::ToolUserInput => self.tool_user_input = handler,
            ApprovalMethod::AuthTokenRefresh => self.auth_token_refresh = handler,
            ApprovalMethod::FuzzyFileSearch => self.fuzzy_file_search = handler,
        }
    }
}

/// Atomically-swappable bundle of nullable per-method callbacks for the
/// enumerated set of server-to-client request methods. A reader always
/// observes either the whole pre-swap or whole post-swap bundle, never a
/// partial one, because `set` builds the next bundle off to the side and
/// installs it with a single pointer swap.
#[derive(Clone)]
pub struct ApprovalTable {
    bundle: Arc<Mutex<Arc<ApprovalBundleInner>>>,
}

impl Default for ApprovalTable {
    fn default() -> Self {
        ApprovalTable {
            bundle: Arc::new(Mutex::new(Arc::new(ApprovalBundleInner::default()))),
        }
    }
}

impl ApprovalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or, with `None`, deregisters) the callback for one method.
    pub fn set(&self, method: ApprovalMethod, handler: Option<RequestHandler>) {
        let mut guard = self.bundle.lock().expect("approval table mutex poisoned");
        let mut next = (**guard).clone();
        next.set(method, handler);
        *guard = Arc::new(next);
    }

    fn snapshot(&self) -> Arc<ApprovalBundleInner> {
        self.bundle
            .lock()
            .expect("approval table mutex poisoned")
            .clone()
    }

    /// Builds the single transport-level [`RequestHandler`] a [`Client`](crate::client::Client)
    /// registers: routes by method name against the enumerated set, answering
    /// method-not-found for anything outside it or whose slot is empty.
    pub fn into_request_handler(self) -> RequestHandler {
        Arc::new(move |method: String, params: Value| -> BoxFuture<Result<Value, AgentError>> {
            let snapshot = self.snapshot();
            Box::pin(async move {
                let handler = ApprovalMethod::from_method_name(&method)
                    .and_then(|approval_method| snapshot.get(approval_method));
                match handler {
                    Some(handler) => handler(method, params).await,
                    None => Err(AgentError::rpc(
                        error_code::METHOD_NOT_FOUND,
                        format!("method not found: {method}"),
                        None,
                    )),
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unset_slot_routes_to_method_not_found() {
        let table = ApprovalTable::new();
        let handler = table.into_request_handler();
        let err = handler("patch/approval".to_string(), Value::Null).await.unwrap_err();
        assert!(matches!(err, AgentError::Rpc { code, .. } if code == error_code::METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn method_outside_the_enumerated_set_is_method_not_found() {
        let table = ApprovalTable::new();
        let handler = table.into_request_handler();
        let err = handler("not/a/real/method".to_string(), Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Rpc { code, .. } if code == error_code::METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn set_then_clear_round_trips_through_the_atomic_swap() {
        let table = ApprovalTable::new();
        table.set(
            ApprovalMethod::PatchApproval,
            Some(Arc::new(|_method, _params| {
                Box::pin(async { Ok(serde_json::json!({"ok": true})) })
            })),
        );
        let handler = table.clone().into_request_handler();
        let result = handler("patch/approval".to_string(), Value::Null).await.unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));

        table.set(ApprovalMethod::PatchApproval, None);
        let handler = table.into_request_handler();
        let err = handler("patch/approval".to_string(), Value::Null).await.unwrap_err();
        assert!(matches!(err, AgentError::Rpc { code, .. } if code == error_code::METHOD_NOT_FOUND));
    }

    #[test]
    fn method_name_round_trips_for_every_enumerated_method() {
        for method in ApprovalMethod::ALL {
            assert_eq!(ApprovalMethod::from_method_name(method.method_name()), Some(method));
        }
        assert_eq!(ApprovalMethod::from_method_name("nonexistent"), None);
    }
}
