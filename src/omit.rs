use serde::Serialize;

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Omit<T> {
    Omitted,
    Present(T),
}

impl<T> Omit<T> {
    pub fn is_omit(&self) -> bool {
        matches!(self, Self::Omitted)
    }
}

impl<T> From<Option<T>> for Omit<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Present(v),
            None => Self::Omitted,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ErrorMessage {
    pub message: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GraphQLResponse {
    #[serde(skip_serializing_if = "Omit::is_omit")]
    pub data: Omit<serde_json::Value>,

    #[serde(skip_serializing_if = "Omit::is_omit")]
    pub errors: Omit<Vec<ErrorMessage>>,
}

impl GraphQLResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: Omit::Omitted,
            errors: Omit::Present(vec![ErrorMessage {
                message: message.into(),
            }]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn omitted_fields_are_not_serialized_test() {
        let response = GraphQLResponse {
            data: Omit::Present(json!({"movies": []})),
            errors: Omit::Omitted,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({"data": {"movies": []}}));

        let value = serde_json::to_value(GraphQLResponse::error("boom")).unwrap();
        assert_eq!(value, json!({"errors": [{"message": "boom"}]}));
    }
}
