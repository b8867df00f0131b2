use async_trait::async_trait;
use serde::Serialize;

use super::{profile_image, ProfileImage};
use crate::cache::CacheResult;
use crate::error::SyncError;
use crate::services::types::CompetencyEntry;
use crate::services::{CompetencyService, UserService};
use crate::session::Session;
use crate::sync::{Context, EntityType, SyncSource};

const NO_COMPETENCIES: &str = "No competencies found";
const COURSE_TITLE: &str = "Course competencies";

/// Competencies of a learning plan or of a course.
pub struct CompetenciesController {
  competency: CompetencyService,
  users: UserService,
  current_user: i64,
  context: Option<Context>,
  user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompetenciesView {
  pub title: String,
  pub id: i64,
  /// Parameter name the id goes under when opening one competency
  pub id_name: &'static str,
  pub competencies: Vec<CompetencyEntry>,
  pub user_id: Option<i64>,
  pub profile: Option<ProfileImage>,
}

impl CompetenciesController {
  pub fn new(session: &Session, context: Option<Context>, user_id: Option<i64>) -> Self {
    Self {
      competency: session.competency(),
      users: session.users(),
      current_user: session.site().user_id(),
      context,
      user_id: user_id.filter(|id| *id > 0),
    }
  }

  async fn enrich(&self, owner: i64) -> (Option<i64>, Option<ProfileImage>) {
    if owner == self.current_user {
      return (None, None);
    }
    (Some(owner), Some(profile_image(&self.users, owner).await))
  }
}

/// Zero competencies counts as a failure so the cache is bypassed once
/// before the user is told.
fn ensure_not_empty(count: i64) -> Result<(), SyncError> {
  if count <= 0 {
    Err(SyncError::EmptyResult(Some(NO_COMPETENCIES.to_string())))
  } else {
    Ok(())
  }
}

#[async_trait]
impl SyncSource for CompetenciesController {
  type Output = CompetenciesView;

  fn entity(&self) -> EntityType {
    EntityType::Competencies
  }

  async fn load(&self, use_cache: bool) -> Result<CacheResult<CompetenciesView>, SyncError> {
    match self.context.ok_or(SyncError::Unaddressable)? {
      Context::ByPlan(plan_id) => {
        let page = self.competency.get_learning_plan(plan_id, use_cache).await?;
        ensure_not_empty(page.data.competencycount)?;

        let (user_id, profile) = self.enrich(page.data.plan.userid).await;
        Ok(page.map(|page| CompetenciesView {
          title: page.plan.name,
          id: page.plan.id,
          id_name: "planid",
          competencies: page.competencies,
          user_id,
          profile,
        }))
      }
      Context::ByCourse(course_id) => {
        let page = self.competency.get_course_competencies(course_id, use_cache).await?;
        ensure_not_empty(page.data.statistics.competencycount)?;

        let (user_id, profile) = match self.user_id {
          Some(user_id) => self.enrich(user_id).await,
          None => (None, None),
        };
        Ok(page.map(|page| CompetenciesView {
          title: COURSE_TITLE.to_string(),
          id: page.courseid,
          id_name: "courseid",
          competencies: page.competencies,
          user_id,
          profile,
        }))
      }
    }
  }

  async fn invalidate(&self) -> Result<(), SyncError> {
    match self.context {
      Some(Context::ByPlan(plan_id)) => self.competency.invalidate_learning_plan(plan_id)?,
      Some(Context::ByCourse(course_id)) => self.competency.invalidate_course_data(course_id)?,
      None => {}
    }
    match self.user_id.filter(|id| *id != self.current_user) {
      Some(user_id) => self.users.invalidate_profile(user_id),
      None => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::SyncEvent;
  use crate::filepool::testing::FakeFiles;
  use crate::session::testing::test_session;
  use crate::site::testing::FakeTransport;
  use crate::sync::SyncResult;
  use serde_json::json;
  use tempfile::TempDir;

  const PLAN_PAGE: &str = "tool_lp_data_for_plan_page";
  const COURSE_PAGE: &str = "tool_lp_data_for_course_competencies_page";

  fn plan_page(owner: i64, count: i64) -> serde_json::Value {
    let competencies: Vec<_> = (0..count)
      .map(|i| json!({"competency": {"id": 100 + i, "shortname": format!("C{}", i)}}))
      .collect();
    json!({
      "plan": {"id": 3, "name": "Nursing", "userid": owner, "status": 1},
      "competencies": competencies,
      "competencycount": count
    })
  }

  #[tokio::test]
  async fn test_plan_mode_view() {
    let transport = FakeTransport::new();
    transport.respond(PLAN_PAGE, plan_page(2, 2));
    let dir = TempDir::new().unwrap();
    let session = test_session(&transport, &FakeFiles::new(), &dir);

    let controller = CompetenciesController::new(&session, Context::from_ids(Some(3), Some(5)), None);
    let mut op = session.operation(controller);
    let view = op.fetch(false).await.into_data().unwrap();

    assert_eq!(view.title, "Nursing");
    assert_eq!(view.id, 3);
    assert_eq!(view.id_name, "planid");
    assert_eq!(view.competencies.len(), 2);
    assert_eq!(view.user_id, None);
    assert_eq!(transport.calls_to(COURSE_PAGE), 0);
  }

  #[tokio::test]
  async fn test_course_mode_view_with_other_user() {
    let transport = FakeTransport::new();
    transport.respond(
      COURSE_PAGE,
      json!({"courseid": 5, "competencies": [{"competency": {"id": 9}}], "statistics": {"competencycount": 1}}),
    );
    transport.fail("core_user_get_users_by_field", "offline");
    let dir = TempDir::new().unwrap();
    let session = test_session(&transport, &FakeFiles::new(), &dir);

    let controller = CompetenciesController::new(&session, Context::from_ids(None, Some(5)), Some(6));
    let mut op = session.operation(controller);
    let view = op.fetch(false).await.into_data().unwrap();

    assert_eq!(view.title, "Course competencies");
    assert_eq!(view.id, 5);
    assert_eq!(view.id_name, "courseid");
    assert_eq!(view.user_id, Some(6));
    assert_eq!(view.profile, Some(ProfileImage::Placeholder));
  }

  #[tokio::test]
  async fn test_without_context_fails_without_network() {
    let transport = FakeTransport::new();
    let dir = TempDir::new().unwrap();
    let mut session = test_session(&transport, &FakeFiles::new(), &dir);

    let controller = CompetenciesController::new(&session, Context::from_ids(None, None), None);
    let mut op = session.operation(controller);
    let result = op.fetch(false).await;

    assert_eq!(result.error(), Some("Error getting competencies data."));
    assert_eq!(transport.total_calls(), 0);
    assert_eq!(session.events().drain().len(), 1);
  }

  #[tokio::test]
  async fn test_zero_count_retries_then_reports_no_competencies() {
    let transport = FakeTransport::new();
    transport.respond(PLAN_PAGE, plan_page(2, 0));
    let dir = TempDir::new().unwrap();
    let mut session = test_session(&transport, &FakeFiles::new(), &dir);

    let mut op = session.operation(CompetenciesController::new(&session, Some(Context::ByPlan(3)), None));
    let result = op.fetch(false).await;

    assert!(result.is_failed());
    assert_eq!(result.error(), Some("No competencies found"));
    assert_eq!(transport.calls_to(PLAN_PAGE), 2);
    assert_eq!(
      session.events().drain(),
      vec![SyncEvent::Error {
        entity: EntityType::Competencies,
        message: "No competencies found".to_string()
      }]
    );
  }

  #[tokio::test]
  async fn test_stale_cache_is_replaced_by_retry() {
    let transport = FakeTransport::new();
    transport.respond(PLAN_PAGE, plan_page(2, 0));
    let dir = TempDir::new().unwrap();
    let session = test_session(&transport, &FakeFiles::new(), &dir);

    // An earlier session cached an empty plan
    session.competency().get_learning_plan(3, true).await.unwrap();
    transport.respond(PLAN_PAGE, plan_page(2, 4));

    let mut op = session.operation(CompetenciesController::new(&session, Some(Context::ByPlan(3)), None));
    let result = op.fetch(false).await;
    match result {
      SyncResult::RefreshedAfterFailure(view) => assert_eq!(view.competencies.len(), 4),
      other => panic!("expected a refreshed view, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_stale_empty_plan_with_site_down_fails() {
    let transport = FakeTransport::new();
    transport.respond(PLAN_PAGE, plan_page(2, 0));
    let dir = TempDir::new().unwrap();
    let mut session = test_session(&transport, &FakeFiles::new(), &dir);
    session.competency().get_learning_plan(3, true).await.unwrap();
    transport.fail(PLAN_PAGE, "offline");

    let mut op = session.operation(CompetenciesController::new(&session, Some(Context::ByPlan(3)), None));
    let result = op.fetch(false).await;

    assert!(result.is_failed());
    assert_eq!(result.error(), Some("Error getting competencies data."));
    assert_eq!(transport.calls_to(PLAN_PAGE), 2);
    assert_eq!(session.events().drain().len(), 1);

    // The rejected entry is gone; the next cached read asks the site again
    assert!(session.competency().get_learning_plan(3, true).await.is_err());
    assert_eq!(transport.calls_to(PLAN_PAGE), 3);
  }

  #[tokio::test]
  async fn test_course_invalidation_cascades_to_competency_details() {
    let transport = FakeTransport::new();
    transport.respond(
      COURSE_PAGE,
      json!({"courseid": 5, "competencies": [{"competency": {"id": 9}}], "statistics": {"competencycount": 1}}),
    );
    let detail = "tool_lp_data_for_user_competency_summary_in_course";
    transport.respond(detail, json!({"usercompetencysummary": {"user": {"id": 2}}}));
    let dir = TempDir::new().unwrap();
    let session = test_session(&transport, &FakeFiles::new(), &dir);
    session.competency().get_competency_in_course(5, 9, None, true).await.unwrap();

    let op = session.operation(CompetenciesController::new(&session, Some(Context::ByCourse(5)), None));
    op.source().invalidate().await.unwrap();

    session.competency().get_competency_in_course(5, 9, None, true).await.unwrap();
    assert_eq!(transport.calls_to(detail), 2);
  }
}
