//! Persistence seam. The core never issues storage queries of its own; it
//! goes through a [`ReflectionStore`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{ConflictError, StoreError};
use crate::models::{
    CeiRecord, DailyReflectionInput, DateRange, RecordId, Scope, WeeklyReflection,
};

#[async_trait]
pub trait ReflectionStore: Send + Sync {
    /// Appends a record. A record with the same scope and date fails with a conflict.
    async fn save(&self, record: &CeiRecord) -> Result<RecordId, StoreError>;

    /// Records for `scope` within `range`, ascending by date.
    async fn fetch_series(
        &self,
        scope: &Scope,
        range: DateRange,
    ) -> Result<Vec<CeiRecord>, StoreError>;

    async fn retract(&self, id: RecordId) -> Result<(), StoreError>;

    /// Number of records ever kept for `scope`, regardless of date.
    async fn record_count(&self, scope: &Scope) -> Result<usize, StoreError>;

    /// Class/subject scopes a teacher has recorded sessions for.
    async fn scopes(&self, teacher_id: &str) -> Result<Vec<Scope>, StoreError>;

    /// Keeps the raw input so a record can be traced back to what was entered.
    async fn archive_input(&self, input: &DailyReflectionInput) -> Result<(), StoreError>;

    /// Sets the roster size of the scope's class. Every subject of the class shares it.
    async fn set_class_size(&self, scope: &Scope, class_size: u32) -> Result<(), StoreError>;

    async fn class_size(&self, scope: &Scope) -> Result<Option<u32>, StoreError>;

    /// Stores the reflection for its week, replacing any earlier text.
    async fn save_weekly_reflection(&self, reflection: &WeeklyReflection)
        -> Result<(), StoreError>;

    /// Weekly reflections for `scope` whose week starts within `range`, oldest first.
    async fn weekly_reflections(
        &self,
        scope: &Scope,
        range: DateRange,
    ) -> Result<Vec<WeeklyReflection>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    records: Vec<(RecordId, CeiRecord)>,
    inputs: Vec<DailyReflectionInput>,
    roster: BTreeMap<(String, String), u32>,
    weekly: Vec<WeeklyReflection>,
}

/// In-process store, used by tests and by callers that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn archived_inputs(&self) -> Vec<DailyReflectionInput> {
        self.state.read().await.inputs.clone()
    }
}

#[async_trait]
impl ReflectionStore for MemoryStore {
    async fn save(&self, record: &CeiRecord) -> Result<RecordId, StoreError> {
        let mut state = self.state.write().await;
        if let Some((existing, _)) = state
            .records
            .iter()
            .find(|(_, r)| r.scope == record.scope && r.date == record.date)
        {
            return Err(ConflictError {
                scope: record.scope.clone(),
                date: record.date,
                existing: *existing,
            }
            .into());
        }

        state.next_id += 1;
        let id = RecordId(state.next_id);
        state.records.push((id, record.clone()));
        Ok(id)
    }

    async fn fetch_series(
        &self,
        scope: &Scope,
        range: DateRange,
    ) -> Result<Vec<CeiRecord>, StoreError> {
        let state = self.state.read().await;
        let mut series: Vec<CeiRecord> = state
            .records
            .iter()
            .map(|(_, record)| record)
            .filter(|record| &record.scope == scope && range.contains(record.date))
            .cloned()
            .collect();
        series.sort_by_key(|record| record.date);
        Ok(series)
    }

    async fn retract(&self, id: RecordId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let before = state.records.len();
        state.records.retain(|(existing, _)| *existing != id);
        if state.records.len() == before {
            return Err(StoreError::UnknownRecord(id));
        }
        Ok(())
    }

    async fn record_count(&self, scope: &Scope) -> Result<usize, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .filter(|(_, record)| &record.scope == scope)
            .count())
    }

    async fn scopes(&self, teacher_id: &str) -> Result<Vec<Scope>, StoreError> {
        let state = self.state.read().await;
        let mut scopes: Vec<Scope> = state
            .records
            .iter()
            .map(|(_, record)| &record.scope)
            .filter(|scope| scope.teacher_id == teacher_id)
            .cloned()
            .collect();
        scopes.sort();
        scopes.dedup();
        Ok(scopes)
    }

    async fn archive_input(&self, input: &DailyReflectionInput) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.inputs.iter().any(|existing| existing.id == input.id) {
            state.inputs.push(input.clone());
        }
        Ok(())
    }

    async fn set_class_size(&self, scope: &Scope, class_size: u32) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .roster
            .insert((scope.teacher_id.clone(), scope.class_id.clone()), class_size);
        Ok(())
    }

    async fn class_size(&self, scope: &Scope) -> Result<Option<u32>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .roster
            .get(&(scope.teacher_id.clone(), scope.class_id.clone()))
            .copied())
    }

    async fn save_weekly_reflection(
        &self,
        reflection: &WeeklyReflection,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.weekly.iter_mut().find(|existing| {
            existing.scope == reflection.scope && existing.week_start == reflection.week_start
        }) {
            Some(existing) => existing.reflection = reflection.reflection.clone(),
            None => state.weekly.push(reflection.clone()),
        }
        Ok(())
    }

    async fn weekly_reflections(
        &self,
        scope: &Scope,
        range: DateRange,
    ) -> Result<Vec<WeeklyReflection>, StoreError> {
        let state = self.state.read().await;
        let mut reflections: Vec<WeeklyReflection> = state
            .weekly
            .iter()
            .filter(|weekly| &weekly.scope == scope && range.contains(weekly.week_start))
            .cloned()
            .collect();
        reflections.sort_by_key(|weekly| weekly.week_start);
        Ok(reflections)
    }
}
