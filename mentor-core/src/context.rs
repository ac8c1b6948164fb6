use serde_json::Value;

/// Who is signed in and what they are studying.
///
/// Created at login and dropped at logout; handed explicitly to whatever needs it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionContext {
    pub user_id: Option<String>,
    pub exam_type: Option<String>,
    pub study_plan: Option<Value>,
}

impl SessionContext {
    pub fn login(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn logout(&mut self) {
        *self = Self::default();
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn set_plan(&mut self, exam_type: impl Into<String>, plan: Value) {
        self.exam_type = Some(exam_type.into());
        self.study_plan = Some(plan);
    }
}
