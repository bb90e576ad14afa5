//! Session: one browser context plus the actor currently logged into it.
//!
//! A session is bound to at most one [`Actor`] at a time. A different actor
//! may only authenticate after [`Session::clear`]; binding without clearing
//! is refused with [`VerificaError::SessionLeak`].
//!
//! Every login attempt is remembered until the next clear, whatever its
//! outcome. A login that the classifier rejects may still have left an
//! authenticated cookie behind.
//!
//! ## Lifecycle
//!
//! ```text
//! open ──bind(A)──▶ bound(A) ──clear()──▶ open ──bind(B)──▶ bound(B)
//!   │                  │                                      │
//!   └──────────────────┴──────────── close() ─────────────────┴──▶ closed
//! ```

use crate::actor::Actor;
use crate::classifier::Observation;
use crate::driver::PageDriver;
use crate::result::{VerificaError, VerificaResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// A browser context exclusively owned by one workflow run
pub struct Session {
    id: Uuid,
    driver: Box<dyn PageDriver>,
    actor: Option<Actor>,
    attempted: Option<Actor>,
    closed: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("actor", &self.actor)
            .field("attempted", &self.attempted)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a session over `driver`
    #[must_use]
    pub fn new(driver: Box<dyn PageDriver>) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver,
            actor: None,
            attempted: None,
            closed: false,
        }
    }

    /// Session id
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Actor currently bound, if any
    #[must_use]
    pub const fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    /// Whether the session was closed
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Access the driver of an open session.
    ///
    /// # Errors
    ///
    /// Returns [`VerificaError::SessionClosed`] after [`Session::close`].
    pub fn driver(&mut self) -> VerificaResult<&mut dyn PageDriver> {
        if self.closed {
            return Err(VerificaError::SessionClosed);
        }
        Ok(self.driver.as_mut())
    }

    /// Actor of the last login attempt since the previous clear
    #[must_use]
    pub const fn attempted(&self) -> Option<&Actor> {
        self.attempted.as_ref()
    }

    /// Remember that `actor` is about to submit credentials
    pub fn mark_attempt(&mut self, actor: &Actor) {
        self.attempted = Some(actor.clone());
    }

    /// Whether authenticating `actor` would need a [`Session::clear`] first.
    ///
    /// True when another actor is bound or another actor's login was
    /// attempted since the last clear.
    #[must_use]
    pub fn needs_clear_for(&self, actor: &Actor) -> bool {
        let other = |seen: &Actor| seen != actor;
        self.actor.as_ref().is_some_and(other) || self.attempted.as_ref().is_some_and(other)
    }

    /// Record that `actor` is now authenticated in this session.
    ///
    /// # Errors
    ///
    /// Returns [`VerificaError::SessionLeak`] if another actor is still bound.
    pub fn bind(&mut self, actor: &Actor) -> VerificaResult<()> {
        if self.closed {
            return Err(VerificaError::SessionClosed);
        }
        if let Some(bound) = &self.actor {
            if bound != actor {
                return Err(VerificaError::SessionLeak {
                    bound: bound.email.clone(),
                    requested: actor.email.clone(),
                });
            }
        }
        debug!(session = %self.id, actor = %actor, "session bound");
        self.actor = Some(actor.clone());
        Ok(())
    }

    /// Drop all cookies, unbind the actor and forget login attempts.
    ///
    /// # Errors
    ///
    /// Returns the driver error if cookies could not be cleared; the actor
    /// stays bound in that case.
    pub async fn clear(&mut self) -> VerificaResult<()> {
        self.driver()?.clear_cookies().await?;
        self.attempted = None;
        if let Some(actor) = self.actor.take() {
            debug!(session = %self.id, actor = %actor, "session cleared");
        }
        Ok(())
    }

    /// Close the browser. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the driver error from the first close attempt.
    pub async fn close(&mut self) -> VerificaResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.actor = None;
        self.attempted = None;
        self.driver.close().await
    }

    /// Take a screenshot and write it to `dir/name.png`.
    ///
    /// # Errors
    ///
    /// Returns driver or I/O errors.
    pub async fn capture(&mut self, dir: &Path, name: &str) -> VerificaResult<PathBuf> {
        let shot = self.driver()?.screenshot().await?;
        if !shot.is_valid() {
            return Err(VerificaError::Screenshot {
                message: "driver returned an empty image".to_string(),
            });
        }
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{name}.png"));
        tokio::fs::write(&path, &shot.data).await?;
        debug!(path = %path.display(), bytes = shot.size_bytes(), "screenshot saved");
        Ok(path)
    }

    /// Read the current URL and visible text.
    ///
    /// # Errors
    ///
    /// Returns driver errors.
    pub async fn observe(&mut self) -> VerificaResult<Observation> {
        let driver = self.driver()?;
        let url = driver.current_url().await?;
        let text = driver.visible_text().await?;
        Ok(Observation::new(url, text))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            warn!(session = %self.id, "session dropped without close");
        }
    }
}
