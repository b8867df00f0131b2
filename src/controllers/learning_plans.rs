use async_trait::async_trait;
use serde::Serialize;

use super::{profile_image, ProfileImage};
use crate::cache::CacheResult;
use crate::error::SyncError;
use crate::services::types::LearningPlan;
use crate::services::{CompetencyService, UserService};
use crate::session::Session;
use crate::sync::{EntityType, SyncSource};

/// Learning plans of the current user, or of another user when given.
pub struct LearningPlansController {
  competency: CompetencyService,
  users: UserService,
  current_user: i64,
  user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearningPlansView {
  pub plans: Vec<LearningPlan>,
  /// Owner of the plans when it is not the current user
  pub user_id: Option<i64>,
  pub profile: Option<ProfileImage>,
}

impl LearningPlansController {
  pub fn new(session: &Session, user_id: Option<i64>) -> Self {
    Self {
      competency: session.competency(),
      users: session.users(),
      current_user: session.site().user_id(),
      user_id: user_id.filter(|id| *id > 0),
    }
  }

  fn other_user(&self) -> Option<i64> {
    self.user_id.filter(|id| *id != self.current_user)
  }
}

#[async_trait]
impl SyncSource for LearningPlansController {
  type Output = LearningPlansView;

  fn entity(&self) -> EntityType {
    EntityType::LearningPlans
  }

  async fn load(&self, use_cache: bool) -> Result<CacheResult<LearningPlansView>, SyncError> {
    let plans = self.competency.get_learning_plans(self.user_id, use_cache).await?;

    let profile = match self.other_user() {
      Some(user_id) => Some(profile_image(&self.users, user_id).await),
      None => None,
    };
    let user_id = self.other_user();

    Ok(plans.map(|plans| LearningPlansView {
      plans,
      user_id,
      profile,
    }))
  }

  async fn invalidate(&self) -> Result<(), SyncError> {
    self.competency.invalidate_learning_plans(self.user_id)?;
    match self.other_user() {
      Some(user_id) => self.users.invalidate_profile(user_id),
      None => Ok(()),
    }
  }
}
