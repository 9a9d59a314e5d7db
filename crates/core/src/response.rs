use serde::{Deserialize, Serialize};

pub const AFFIRM_PAYLOAD: &str = "/affirm";
pub const DENY_PAYLOAD: &str = "/deny";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub title: String,
    pub payload: String,
}

impl Button {
    pub fn new(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { title: title.into(), payload: payload.into() }
    }
}

/// A piece of a turn's reply, in the order it should be shown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseFragment {
    Text { text: String },
    Buttons { buttons: Vec<Button> },
}

impl ResponseFragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn age_confirmation() -> Self {
        Self::Buttons {
            buttons: vec![
                Button::new("Sí, soy mayor de edad", AFFIRM_PAYLOAD),
                Button::new("No", DENY_PAYLOAD),
            ],
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Buttons { .. } => None,
        }
    }

    pub fn is_buttons(&self) -> bool {
        matches!(self, Self::Buttons { .. })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ResponseFragment;

    #[test]
    fn fragments_serialize_without_a_tag() {
        let text = serde_json::to_value(ResponseFragment::text("hola")).expect("serialize text");
        assert_eq!(text, json!({"text": "hola"}));

        let buttons = serde_json::to_value(ResponseFragment::age_confirmation()).expect("serialize buttons");
        assert_eq!(
            buttons,
            json!({"buttons": [
                {"title": "Sí, soy mayor de edad", "payload": "/affirm"},
                {"title": "No", "payload": "/deny"}
            ]})
        );
    }

    #[test]
    fn fragments_deserialize_by_shape() {
        let fragment: ResponseFragment =
            serde_json::from_value(json!({"buttons": []})).expect("deserialize buttons");
        assert!(fragment.is_buttons());
        assert_eq!(fragment.as_text(), None);
    }
}
