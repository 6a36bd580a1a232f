use common::ApiType;
use std::collections::HashMap;

/// Static declaration of one concrete endpoint (§4.5). Flags are fields on
/// the descriptor rather than class-hierarchy markers, per the design note
/// on polymorphism of endpoints.
pub struct EndpointDescriptor {
    pub path: &'static str,
    pub method: Method,
    pub api_types: &'static [ApiType],
    pub required_args: &'static [&'static str],
    pub optional_args: &'static [&'static str],
    /// `{language -> prompt-id}`; `None` if this endpoint has no system
    /// prompt (simple-proxy endpoints).
    pub system_prompt_name: Option<HashMap<&'static str, &'static str>>,
    pub direct_return: bool,
    pub call_for_each_user_msg: bool,
    pub dont_add_api_prefix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl EndpointDescriptor {
    /// §9 open question: `call_for_each_user_msg` combined with
    /// `direct_return` is rejected at registration, it's not a meaningful
    /// combination (there would be no upstream call to fan out).
    pub fn validate(&self) -> Result<(), String> {
        if self.call_for_each_user_msg && self.direct_return {
            return Err(format!(
                "endpoint '{}': call_for_each_user_msg and direct_return are mutually exclusive",
                self.path
            ));
        }
        Ok(())
    }

    pub fn accepts_api_type(&self, api_type: ApiType) -> bool {
        self.api_types.contains(&api_type)
    }
}
