use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use super::ProfileImage;
use crate::cache::CacheResult;
use crate::error::SyncError;
use crate::services::competency::review_status_name;
use crate::services::types::{CourseModule, UserCompetencySummary};
use crate::services::CompetencyService;
use crate::session::Session;
use crate::sync::{Context, EntityType, SyncSource};

/// One competency of a plan or a course, as rated for a user.
pub struct CompetencyController {
  competency: CompetencyService,
  current_user: i64,
  context: Option<Context>,
  competency_id: i64,
  user_id: Option<i64>,
  viewed: AtomicBool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompetencyView {
  pub summary: UserCompetencySummary,
  /// Status of the plan, in plan mode
  pub plan_status: Option<i64>,
  /// Activities linked to the competency, in course mode
  pub course_modules: Vec<CourseModule>,
  pub user_id: Option<i64>,
  pub profile: Option<ProfileImage>,
}

impl CompetencyController {
  pub fn new(session: &Session, context: Option<Context>, competency_id: i64, user_id: Option<i64>) -> Self {
    Self {
      competency: session.competency(),
      current_user: session.site().user_id(),
      context,
      competency_id,
      user_id: user_id.filter(|id| *id > 0),
      viewed: AtomicBool::new(false),
    }
  }

  /// Record the first successful display with the site. Failures are only logged.
  async fn log_view_once(&self, context: Context, plan_status: Option<i64>) {
    if self.viewed.swap(true, Ordering::SeqCst) {
      return;
    }
    let logged = match context {
      Context::ByPlan(plan_id) => {
        self
          .competency
          .log_competency_in_plan_view(plan_id, self.competency_id, plan_status.unwrap_or_default(), self.user_id)
          .await
      }
      Context::ByCourse(course_id) => {
        self
          .competency
          .log_competency_in_course_view(course_id, self.competency_id, self.user_id)
          .await
      }
    };
    match logged {
      Ok(_) => debug!(competency = self.competency_id, "logged competency view"),
      Err(e) => warn!(competency = self.competency_id, error = %e, "Failed to log competency view"),
    }
  }

  fn finish(&self, mut view: CompetencyView) -> CompetencyView {
    let owner = view.summary.user.id;
    if owner != self.current_user {
      view.user_id = Some(owner);
      view.profile = Some(ProfileImage::from_url(view.summary.user.profileimageurl.as_deref()));
    }
    view
  }
}

#[async_trait]
impl SyncSource for CompetencyController {
  type Output = CompetencyView;

  fn entity(&self) -> EntityType {
    EntityType::Competency
  }

  async fn load(&self, use_cache: bool) -> Result<CacheResult<CompetencyView>, SyncError> {
    let context = self.context.ok_or(SyncError::Unaddressable)?;
    let result = match context {
      Context::ByPlan(plan_id) => self
        .competency
        .get_competency_in_plan(plan_id, self.competency_id, use_cache)
        .await?
        .map(|data| {
          let mut summary = data.usercompetencysummary;
          if let Some(uc) = summary.usercompetency.as_mut() {
            if let Some(name) = review_status_name(uc.status) {
              uc.statusname = Some(name.to_string());
            }
          }
          self.finish(CompetencyView {
            summary,
            plan_status: Some(data.plan.status),
            course_modules: Vec::new(),
            user_id: None,
            profile: None,
          })
        }),
      Context::ByCourse(course_id) => self
        .competency
        .get_competency_in_course(course_id, self.competency_id, self.user_id, use_cache)
        .await?
        .map(|data| {
          let mut summary = data.usercompetencysummary;
          summary.usercompetency = summary.usercompetencycourse.clone();
          self.finish(CompetencyView {
            summary,
            plan_status: None,
            course_modules: data.coursemodules,
            user_id: None,
            profile: None,
          })
        }),
    };

    self.log_view_once(context, result.data.plan_status).await;
    Ok(result)
  }

  async fn invalidate(&self) -> Result<(), SyncError> {
    match self.context {
      Some(Context::ByPlan(plan_id)) => self
        .competency
        .invalidate_competency_in_plan(plan_id, self.competency_id),
      Some(Context::ByCourse(course_id)) => self
        .competency
        .invalidate_competency_in_course(course_id, self.competency_id, None),
      None => Ok(()),
    }
  }
}
