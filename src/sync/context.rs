use serde::Serialize;

/// How a competency request is addressed.
///
/// Plan addressing wins when both ids are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "by", content = "id")]
pub enum Context {
  ByPlan(i64),
  ByCourse(i64),
}

impl Context {
  /// Pick the addressing mode from optional ids; non-positive ids count as
  /// absent. `None` means the request cannot be addressed at all.
  pub fn from_ids(plan_id: Option<i64>, course_id: Option<i64>) -> Option<Self> {
    match (positive(plan_id), positive(course_id)) {
      (Some(plan), _) => Some(Context::ByPlan(plan)),
      (None, Some(course)) => Some(Context::ByCourse(course)),
      (None, None) => None,
    }
  }
}

fn positive(id: Option<i64>) -> Option<i64> {
  id.filter(|id| *id > 0)
}
