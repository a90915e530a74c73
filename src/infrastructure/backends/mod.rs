pub mod gemini;
#[cfg(test)]
pub mod scripted;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

use anyhow::Result;

use crate::domain::models::BackendBox;
use crate::domain::models::BackendName;

pub struct BackendManager {}

impl BackendManager {
    pub fn get(name: BackendName) -> Result<BackendBox> {
        match name {
            BackendName::Gemini => return Ok(Box::<gemini::Gemini>::default()),
        }
    }
}
