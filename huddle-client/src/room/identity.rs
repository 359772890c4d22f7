use crate::error::SessionError;
use uuid::Uuid;

const SUFFIX_LEN: usize = 6;

/// Who we are in which room.
///
/// Keeps the name the user typed so that every rejoin derives its suffixed
/// name from it instead of stacking suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    room: String,
    base: String,
    username: String,
    joins: u32,
}

impl LocalIdentity {
    pub fn new(room: &str, username: &str) -> Result<Self, SessionError> {
        let (room, base) = Self::validate(room, username)?;
        Ok(Self {
            room: room.to_owned(),
            base: base.to_owned(),
            username: base.to_owned(),
            joins: 0,
        })
    }

    /// Trimmed room and username, both non-empty.
    pub fn validate<'a>(room: &'a str, username: &'a str) -> Result<(&'a str, &'a str), SessionError> {
        let room = room.trim();
        let username = username.trim();
        if room.is_empty() || username.is_empty() {
            return Err(SessionError::InvalidIdentity);
        }
        Ok((room, username))
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Name used for the current (or last) join.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn joins(&self) -> u32 {
        self.joins
    }

    pub fn matches(&self, room: &str, username: &str) -> bool {
        self.room == room.trim() && self.base == username.trim()
    }

    /// Pick the username for the next join: the base name the first time,
    /// `base_<suffix>` afterwards, never equal to the previous one.
    pub fn next_join_username(&mut self) -> &str {
        if self.joins > 0 {
            let mut candidate = suffixed(&self.base);
            while candidate == self.username {
                candidate = suffixed(&self.base);
            }
            self.username = candidate;
        }
        self.joins += 1;
        &self.username
    }
}

fn suffixed(base: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}_{}", base, &id[..SUFFIX_LEN])
}
