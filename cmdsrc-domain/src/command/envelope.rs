use super::{CommandAction, EntityType, ResourceRef};
use crate::error::{DomainError, DomainResult};
use bon::Builder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// 分组键占位符：等价于未指定
const GROUPING_KEY_PLACEHOLDER: &str = "N/A";

/// 命令构造输入（未经校验）
///
/// ```
/// use cmdsrc_domain::command::{CommandAction, CommandRequest};
///
/// let envelope = CommandRequest::builder()
///     .action(CommandAction::Waive)
///     .entity_type("LOANCHARGE")
///     .parent_resource("loans")
///     .parent_id(10)
///     .sub_resource("charges")
///     .target_id(55)
///     .build()
///     .into_envelope()
///     .unwrap();
///
/// assert_eq!(envelope.target_id(), Some(55));
/// assert!(envelope.payload().is_empty());
/// ```
#[derive(Builder, Debug, Clone)]
pub struct CommandRequest {
    pub action: CommandAction,
    #[builder(into)]
    pub entity_type: String,
    #[builder(into)]
    pub grouping_key: Option<String>,
    #[builder(into)]
    pub parent_resource: String,
    pub parent_id: i64,
    #[builder(into)]
    pub sub_resource: String,
    pub target_id: Option<i64>,
    #[builder(default)]
    pub payload: Value,
}

impl CommandRequest {
    /// 结构校验并生成不可变的命令信封
    pub fn into_envelope(self) -> DomainResult<CommandEnvelope> {
        CommandEnvelope::try_from(self)
    }
}

/// 命令信封：一次写请求的不可变描述
///
/// 不变式：`target_id` 对 UPDATE/WAIVE/DELETE 必须存在，对 CREATE 必须缺省；
/// `payload` 恒为 JSON 对象。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    action: CommandAction,
    entity_type: EntityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    grouping_key: Option<String>,
    parent: ResourceRef,
    sub_resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_id: Option<i64>,
    payload: Map<String, Value>,
}

impl CommandEnvelope {
    pub fn builder() -> CommandRequestBuilder {
        CommandRequest::builder()
    }

    pub fn action(&self) -> CommandAction {
        self.action
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn grouping_key(&self) -> Option<&str> {
        self.grouping_key.as_deref()
    }

    pub fn parent(&self) -> &ResourceRef {
        &self.parent
    }

    pub fn sub_resource(&self) -> &str {
        &self.sub_resource
    }

    pub fn target_id(&self) -> Option<i64> {
        self.target_id
    }

    /// 目标实体标识；调用方需保证动作要求目标（构造时已校验）
    pub fn require_target(&self) -> DomainResult<i64> {
        self.target_id.ok_or_else(|| {
            DomainError::malformed(format!("{} requires a target id", self.action))
        })
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// 按处理器自身的 schema 解析载荷
    pub fn payload_as<T: DeserializeOwned>(&self) -> DomainResult<T> {
        serde_json::from_value(Value::Object(self.payload.clone()))
            .map_err(|e| DomainError::validation("payload", e.to_string()))
    }

    /// 资源路径（用于日志），如 `loans/10/charges/55`
    pub fn resource_path(&self) -> String {
        match self.target_id {
            Some(id) => format!("{}/{}/{}", self.parent, self.sub_resource, id),
            None => format!("{}/{}", self.parent, self.sub_resource),
        }
    }
}

impl TryFrom<CommandRequest> for CommandEnvelope {
    type Error = DomainError;

    fn try_from(req: CommandRequest) -> Result<Self, Self::Error> {
        let entity_type = EntityType::new(&req.entity_type)?;

        let parent_resource = req.parent_resource.trim();
        if parent_resource.is_empty() {
            return Err(DomainError::malformed("parent resource must not be blank"));
        }
        if req.parent_id <= 0 {
            return Err(DomainError::malformed(format!(
                "parent id must be positive, got {}",
                req.parent_id
            )));
        }

        let sub_resource = req.sub_resource.trim();
        if sub_resource.is_empty() {
            return Err(DomainError::malformed("sub resource must not be blank"));
        }

        match (req.action.requires_target(), req.target_id) {
            (true, None) => {
                return Err(DomainError::malformed(format!(
                    "{} requires a target id",
                    req.action
                )));
            }
            (false, Some(id)) => {
                return Err(DomainError::malformed(format!(
                    "{} must not carry a target id, got {id}",
                    req.action
                )));
            }
            (true, Some(id)) if id <= 0 => {
                return Err(DomainError::malformed(format!(
                    "target id must be positive, got {id}"
                )));
            }
            _ => {}
        }

        let payload = match req.payload {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(DomainError::malformed(format!(
                    "payload must be a JSON object, got {}",
                    json_kind(&other)
                )));
            }
        };

        let grouping_key = req
            .grouping_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty() && !key.eq_ignore_ascii_case(GROUPING_KEY_PLACEHOLDER));

        Ok(Self {
            action: req.action,
            entity_type,
            grouping_key,
            parent: ResourceRef::new(parent_resource, req.parent_id),
            sub_resource: sub_resource.to_string(),
            target_id: req.target_id,
            payload,
        })
    }
}

/// 解析原始请求体；空白请求体视为 `{}`
pub fn parse_payload(raw: &str) -> DomainResult<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DomainError::malformed(format!("request body is not valid JSON: {e}")))?;

    if !value.is_object() {
        return Err(DomainError::malformed(format!(
            "request body must be a JSON object, got {}",
            json_kind(&value)
        )));
    }

    Ok(value)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
