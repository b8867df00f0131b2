//! Learning plans and competencies.

use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::types::{
  CompetencyInCourse, CompetencyInPlan, CourseCompetenciesPage, LearningPlan, PlanList, PlanPage,
  PLAN_STATUS_COMPLETE,
};
use crate::cache::{CacheResult, QueryKey};
use crate::error::SyncError;
use crate::site::{PreSets, Site};

/// Review status of a user competency as stored by the site
pub const REVIEW_STATUS_IDLE: i64 = 0;
pub const REVIEW_STATUS_IN_REVIEW: i64 = 1;
pub const REVIEW_STATUS_WAITING_FOR_REVIEW: i64 = 2;

const KEY_ROOT: &str = "competency";

/// Cache keys of the competency reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompetencyKey {
  UserPlans { user_id: i64 },
  LearningPlan { plan_id: i64 },
  CourseCompetencies { course_id: i64 },
  CompetencyInPlan { plan_id: i64, competency_id: i64 },
  CompetencyInCourse { course_id: i64, competency_id: i64, user_id: i64 },
}

impl QueryKey for CompetencyKey {
  fn cache_key(&self) -> String {
    match self {
      Self::UserPlans { user_id } => format!("{}:userplans:{}", KEY_ROOT, user_id),
      Self::LearningPlan { plan_id } => format!("{}:learningplan:{}", KEY_ROOT, plan_id),
      Self::CourseCompetencies { course_id } => {
        format!("{}:coursecompetencies:{}", KEY_ROOT, course_id)
      }
      Self::CompetencyInPlan { plan_id, competency_id } => {
        format!("{}:competencyinplan:{}:{}", KEY_ROOT, plan_id, competency_id)
      }
      Self::CompetencyInCourse { course_id, competency_id, user_id } => format!(
        "{}{}",
        competency_in_course_prefix(*course_id, Some(*competency_id)),
        user_id
      ),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::UserPlans { user_id } => format!("learning plans of user {}", user_id),
      Self::LearningPlan { plan_id } => format!("learning plan {}", plan_id),
      Self::CourseCompetencies { course_id } => format!("competencies of course {}", course_id),
      Self::CompetencyInPlan { plan_id, competency_id } => {
        format!("competency {} in plan {}", competency_id, plan_id)
      }
      Self::CompetencyInCourse { course_id, competency_id, user_id } => format!(
        "competency {} in course {} for user {}",
        competency_id, course_id, user_id
      ),
    }
  }
}

/// Prefix shared by competency-in-course entries of a course, optionally
/// narrowed to one competency.
fn competency_in_course_prefix(course_id: i64, competency_id: Option<i64>) -> String {
  match competency_id {
    Some(competency_id) => format!(
      "{}:competencyincourse:{}:{}:",
      KEY_ROOT, course_id, competency_id
    ),
    None => format!("{}:competencyincourse:{}:", KEY_ROOT, course_id),
  }
}

/// English name of a review status, `None` for statuses the site names itself.
pub fn review_status_name(status: i64) -> Option<&'static str> {
  match status {
    REVIEW_STATUS_IDLE => Some("Idle"),
    REVIEW_STATUS_IN_REVIEW => Some("In review"),
    REVIEW_STATUS_WAITING_FOR_REVIEW => Some("Waiting for review"),
    _ => None,
  }
}

#[derive(Clone)]
pub struct CompetencyService {
  site: Arc<Site>,
}

impl CompetencyService {
  pub fn new(site: Arc<Site>) -> Self {
    Self { site }
  }

  fn user_or_current(&self, user_id: Option<i64>) -> i64 {
    user_id.unwrap_or_else(|| self.site.user_id())
  }

  pub async fn get_learning_plans(
    &self,
    user_id: Option<i64>,
    use_cache: bool,
  ) -> Result<CacheResult<Vec<LearningPlan>>, SyncError> {
    let user_id = self.user_or_current(user_id);
    let key = CompetencyKey::UserPlans { user_id };
    let result = self
      .site
      .read::<PlanList>(
        "core_competency_list_user_plans",
        json!({ "userid": user_id }),
        PreSets::keyed(&key, use_cache),
      )
      .await?;
    Ok(result.map(PlanList::into_plans))
  }

  pub async fn get_learning_plan(
    &self,
    plan_id: i64,
    use_cache: bool,
  ) -> Result<CacheResult<PlanPage>, SyncError> {
    let key = CompetencyKey::LearningPlan { plan_id };
    self
      .site
      .read(
        "tool_lp_data_for_plan_page",
        json!({ "planid": plan_id }),
        PreSets::keyed(&key, use_cache),
      )
      .await
  }

  pub async fn get_course_competencies(
    &self,
    course_id: i64,
    use_cache: bool,
  ) -> Result<CacheResult<CourseCompetenciesPage>, SyncError> {
    let key = CompetencyKey::CourseCompetencies { course_id };
    self
      .site
      .read(
        "tool_lp_data_for_course_competencies_page",
        json!({ "courseid": course_id }),
        PreSets::keyed(&key, use_cache),
      )
      .await
  }

  pub async fn get_competency_in_plan(
    &self,
    plan_id: i64,
    competency_id: i64,
    use_cache: bool,
  ) -> Result<CacheResult<CompetencyInPlan>, SyncError> {
    let key = CompetencyKey::CompetencyInPlan { plan_id, competency_id };
    self
      .site
      .read(
        "tool_lp_data_for_user_competency_summary_in_plan",
        json!({ "planid": plan_id, "competencyid": competency_id }),
        PreSets::keyed(&key, use_cache),
      )
      .await
  }

  pub async fn get_competency_in_course(
    &self,
    course_id: i64,
    competency_id: i64,
    user_id: Option<i64>,
    use_cache: bool,
  ) -> Result<CacheResult<CompetencyInCourse>, SyncError> {
    let user_id = self.user_or_current(user_id);
    let key = CompetencyKey::CompetencyInCourse { course_id, competency_id, user_id };
    self
      .site
      .read(
        "tool_lp_data_for_user_competency_summary_in_course",
        json!({ "courseid": course_id, "competencyid": competency_id, "userid": user_id }),
        PreSets::keyed(&key, use_cache),
      )
      .await
  }

  pub fn invalidate_learning_plans(&self, user_id: Option<i64>) -> Result<(), SyncError> {
    let key = CompetencyKey::UserPlans { user_id: self.user_or_current(user_id) };
    self.site.invalidate_ws_cache_for_key(&key.cache_key())
  }

  pub fn invalidate_learning_plan(&self, plan_id: i64) -> Result<(), SyncError> {
    let key = CompetencyKey::LearningPlan { plan_id };
    self.site.invalidate_ws_cache_for_key(&key.cache_key())
  }

  pub fn invalidate_course_competencies(&self, course_id: i64) -> Result<(), SyncError> {
    let key = CompetencyKey::CourseCompetencies { course_id };
    self.site.invalidate_ws_cache_for_key(&key.cache_key())
  }

  pub fn invalidate_competency_in_plan(&self, plan_id: i64, competency_id: i64) -> Result<(), SyncError> {
    let key = CompetencyKey::CompetencyInPlan { plan_id, competency_id };
    self.site.invalidate_ws_cache_for_key(&key.cache_key())
  }

  /// Without a user id every user's entry for the competency is dropped.
  pub fn invalidate_competency_in_course(
    &self,
    course_id: i64,
    competency_id: i64,
    user_id: Option<i64>,
  ) -> Result<(), SyncError> {
    match user_id {
      Some(user_id) => {
        let key = CompetencyKey::CompetencyInCourse { course_id, competency_id, user_id };
        self.site.invalidate_ws_cache_for_key(&key.cache_key())
      }
      None => self
        .site
        .invalidate_ws_cache_for_key_starting_with(&competency_in_course_prefix(course_id, Some(competency_id))),
    }
  }

  /// Drop the course page and every competency-in-course entry of the course.
  pub fn invalidate_course_data(&self, course_id: i64) -> Result<(), SyncError> {
    debug!(course_id, "invalidating course competency data");
    self.invalidate_course_competencies(course_id)?;
    self
      .site
      .invalidate_ws_cache_for_key_starting_with(&competency_in_course_prefix(course_id, None))
  }

  /// Report a competency of a plan as viewed. Completed plans log the
  /// archived competency instead.
  pub async fn log_competency_in_plan_view(
    &self,
    plan_id: i64,
    competency_id: i64,
    plan_status: i64,
    user_id: Option<i64>,
  ) -> Result<bool, SyncError> {
    let function = if plan_status == PLAN_STATUS_COMPLETE {
      "core_competency_user_competency_plan_viewed"
    } else {
      "core_competency_user_competency_viewed_in_plan"
    };
    let params = json!({
      "competencyid": competency_id,
      "userid": self.user_or_current(user_id),
      "planid": plan_id,
    });
    self.site.write(function, params).await
  }

  pub async fn log_competency_in_course_view(
    &self,
    course_id: i64,
    competency_id: i64,
    user_id: Option<i64>,
  ) -> Result<bool, SyncError> {
    let params = json!({
      "competencyid": competency_id,
      "userid": self.user_or_current(user_id),
      "courseid": course_id,
    });
    self
      .site
      .write("core_competency_user_competency_viewed_in_course", params)
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::site::testing::{test_site, FakeTransport};

  fn service(transport: &FakeTransport) -> CompetencyService {
    CompetencyService::new(Arc::new(test_site(transport)))
  }

  #[test]
  fn test_cache_keys() {
    assert_eq!(
      CompetencyKey::UserPlans { user_id: 2 }.cache_key(),
      "competency:userplans:2"
    );
    assert_eq!(
      CompetencyKey::CompetencyInPlan { plan_id: 3, competency_id: 7 }.cache_key(),
      "competency:competencyinplan:3:7"
    );
    assert_eq!(
      CompetencyKey::CompetencyInCourse { course_id: 5, competency_id: 7, user_id: 2 }.cache_key(),
      "competency:competencyincourse:5:7:2"
    );
    assert_ne!(
      CompetencyKey::CompetencyInCourse { course_id: 5, competency_id: 7, user_id: 2 }.cache_key(),
      CompetencyKey::CompetencyInCourse { course_id: 5, competency_id: 7, user_id: 3 }.cache_key()
    );
  }

  #[test]
  fn test_review_status_names() {
    assert_eq!(review_status_name(0), Some("Idle"));
    assert_eq!(review_status_name(1), Some("In review"));
    assert_eq!(review_status_name(2), Some("Waiting for review"));
    assert_eq!(review_status_name(5), None);
  }

  #[tokio::test]
  async fn test_learning_plans_default_to_current_user() {
    let transport = FakeTransport::new();
    transport.respond("core_competency_list_user_plans", json!([{"id": 1, "name": "Plan"}]));
    let service = service(&transport);

    let plans = service.get_learning_plans(None, true).await.unwrap();
    assert_eq!(plans.data.len(), 1);
    assert_eq!(
      transport.last_params("core_competency_list_user_plans"),
      Some(json!({"userid": 2}))
    );

    let cached = service.get_learning_plans(Some(2), true).await.unwrap();
    assert_eq!(cached.source, CacheSource::Cache);
    assert_eq!(transport.calls_to("core_competency_list_user_plans"), 1);
  }

  #[tokio::test]
  async fn test_invalidate_then_read_refetches() {
    let transport = FakeTransport::new();
    transport.respond("tool_lp_data_for_plan_page", json!({"plan": {"id": 3}, "competencycount": 0}));
    let service = service(&transport);

    service.get_learning_plan(3, true).await.unwrap();
    service.get_learning_plan(3, true).await.unwrap();
    assert_eq!(transport.calls_to("tool_lp_data_for_plan_page"), 1);

    service.invalidate_learning_plan(3).unwrap();
    service.invalidate_learning_plan(3).unwrap();
    service.get_learning_plan(3, true).await.unwrap();
    assert_eq!(transport.calls_to("tool_lp_data_for_plan_page"), 2);
  }

  #[tokio::test]
  async fn test_course_data_invalidation_cascades() {
    let transport = FakeTransport::new();
    let function = "tool_lp_data_for_user_competency_summary_in_course";
    transport.respond(function, json!({"usercompetencysummary": {"user": {"id": 2}}}));
    transport.respond("tool_lp_data_for_course_competencies_page", json!({"courseid": 5}));
    let service = service(&transport);

    service.get_course_competencies(5, true).await.unwrap();
    service.get_competency_in_course(5, 7, Some(2), true).await.unwrap();
    service.get_competency_in_course(5, 7, Some(3), true).await.unwrap();
    service.get_competency_in_course(6, 7, Some(2), true).await.unwrap();
    assert_eq!(transport.calls_to(function), 3);

    service.invalidate_course_data(5).unwrap();

    service.get_course_competencies(5, true).await.unwrap();
    service.get_competency_in_course(5, 7, Some(2), true).await.unwrap();
    service.get_competency_in_course(5, 7, Some(3), true).await.unwrap();
    let other_course = service.get_competency_in_course(6, 7, Some(2), true).await.unwrap();
    assert_eq!(transport.calls_to("tool_lp_data_for_course_competencies_page"), 2);
    assert_eq!(transport.calls_to(function), 5);
    assert_eq!(other_course.source, CacheSource::Cache);
  }

  #[tokio::test]
  async fn test_competency_in_course_invalidation_without_user_covers_all_users() {
    let transport = FakeTransport::new();
    let function = "tool_lp_data_for_user_competency_summary_in_course";
    transport.respond(function, json!({"usercompetencysummary": {"user": {"id": 2}}}));
    let service = service(&transport);

    service.get_competency_in_course(5, 7, Some(2), true).await.unwrap();
    service.get_competency_in_course(5, 7, Some(3), true).await.unwrap();
    service.get_competency_in_course(5, 8, Some(3), true).await.unwrap();

    service.invalidate_competency_in_course(5, 7, None).unwrap();

    let a = service.get_competency_in_course(5, 7, Some(2), true).await.unwrap();
    let b = service.get_competency_in_course(5, 7, Some(3), true).await.unwrap();
    let c = service.get_competency_in_course(5, 8, Some(3), true).await.unwrap();
    assert_eq!(a.source, CacheSource::Network);
    assert_eq!(b.source, CacheSource::Network);
    assert_eq!(c.source, CacheSource::Cache);
  }

  #[tokio::test]
  async fn test_plan_view_log_depends_on_plan_status() {
    let transport = FakeTransport::new();
    transport.respond("core_competency_user_competency_viewed_in_plan", json!(true));
    transport.respond("core_competency_user_competency_plan_viewed", json!(true));
    let service = service(&transport);

    service.log_competency_in_plan_view(3, 7, 1, None).await.unwrap();
    service
      .log_competency_in_plan_view(3, 7, PLAN_STATUS_COMPLETE, Some(4))
      .await
      .unwrap();

    assert_eq!(transport.calls_to("core_competency_user_competency_viewed_in_plan"), 1);
    assert_eq!(
      transport.last_params("core_competency_user_competency_plan_viewed"),
      Some(json!({"competencyid": 7, "userid": 4, "planid": 3}))
    );
  }
}
