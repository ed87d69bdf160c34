//! Signed-in operator session
//!
//! Holds everything that used to live for the whole process: who is
//! scanning, the session label they typed, and their recent-activity log.
//! Created on sign-in and dropped on sign-out, which resets the log.

use crate::domain::types::normalize_session;
use crate::domain::OperatorContext;
use crate::services::presenter::ResultPresenter;

#[derive(Debug)]
pub struct OperatorSession {
    context: OperatorContext,
    exam_session: Option<String>,
    presenter: ResultPresenter,
}

impl OperatorSession {
    pub fn new(context: OperatorContext, exam_session: Option<&str>) -> Self {
        Self {
            context,
            exam_session: normalize_session(exam_session),
            presenter: ResultPresenter::new(),
        }
    }

    pub fn context(&self) -> &OperatorContext {
        &self.context
    }

    /// Session label typed by the operator, if any
    pub fn exam_session(&self) -> Option<&str> {
        self.exam_session.as_deref()
    }

    pub fn set_exam_session(&mut self, label: Option<&str>) {
        self.exam_session = normalize_session(label);
    }

    pub fn presenter(&self) -> &ResultPresenter {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut ResultPresenter {
        &mut self.presenter
    }
}
