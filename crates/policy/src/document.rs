use geovault_core::Expr;
use serde::ser::{Serialize, SerializeMap, Serializer};

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Effect { Allow, Deny }

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Every principal, authenticated or not.
    Any,
    Service(String),
    /// The root of an account, i.e. any identity the account delegates to.
    Account(String),
}

impl Serialize for Principal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut m = serializer.serialize_map(Some(1))?;
        match self {
            Principal::Any => m.serialize_entry("AWS", "*")?,
            Principal::Service(s) => m.serialize_entry("Service", s)?,
            Principal::Account(a) => m.serialize_entry("AWS", &format!("arn:aws:iam::{a}:root"))?,
        }
        m.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<Expr>,
}

impl PolicyStatement {
    pub fn allow<A: Into<String>>(actions: impl IntoIterator<Item = A>, resources: impl IntoIterator<Item = Expr>) -> Self {
        Self::new(Effect::Allow, actions, resources)
    }

    pub fn deny<A: Into<String>>(actions: impl IntoIterator<Item = A>, resources: impl IntoIterator<Item = Expr>) -> Self {
        Self::new(Effect::Deny, actions, resources)
    }

    fn new<A: Into<String>>(effect: Effect, actions: impl IntoIterator<Item = A>, resources: impl IntoIterator<Item = Expr>) -> Self {
        Self {
            sid: None,
            effect,
            principal: None,
            action: actions.into_iter().map(Into::into).collect(),
            resource: resources.into_iter().collect(),
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn sid(&self) -> Option<&str> { self.sid.as_deref() }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: &'static str,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self { Self { version: POLICY_VERSION, statement } }

    /// Trust policy letting `principal` assume the role it is attached to.
    pub fn assumable_by(principal: Principal) -> Self {
        Self::new(vec![PolicyStatement::allow(["sts:AssumeRole"], []).with_principal(principal)])
    }
}
