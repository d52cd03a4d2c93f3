use serde::{Deserialize, Serialize};

use crate::model::{Role, User};

/// Who is making the request, as read from the session. The access policy only ever
/// sees this triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub user_id: String,
    pub phone_number: String,
    pub role: Role,
}

impl SessionIdentity {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

impl From<&User> for SessionIdentity {
    fn from(u: &User) -> Self {
        Self { user_id: u.id.clone(), phone_number: u.phone_number.clone(), role: u.role }
    }
}
