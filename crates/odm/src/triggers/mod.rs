//! Lifecycle triggers
//!
//! Callbacks and field validators bound to points of the save and delete
//! lifecycle. Triggers are declared per model, inherited through
//! [`MetaDeclaration::extends`](crate::meta::MetaDeclaration::extends) and
//! fired in declaration order.

pub mod context;
pub mod phase;
pub mod set;
pub mod trigger;

pub use context::TriggerContext;
pub use phase::TriggerPhase;
pub use set::TriggerSet;
pub use trigger::{Transform, Trigger, TriggerFuture, TriggerId, ValidatorFailure};

use crate::error::ModelResult;
use crate::model::Model;

macro_rules! phase_shorthand {
    ($($name:ident => $phase:ident),* $(,)?) => {
        $(
            #[doc = concat!("Synchronous `", stringify!($name), "` trigger")]
            pub fn $name<M, F>(f: F) -> Trigger<M>
            where
                M: Model,
                F: Fn(&mut M, &TriggerContext) -> ModelResult<()> + Send + Sync + 'static,
            {
                Trigger::sync(TriggerPhase::$phase, f)
            }
        )*
    };
}

phase_shorthand! {
    before_save => BeforeSave,
    after_save => AfterSave,
    before_create => BeforeCreate,
    after_create => AfterCreate,
    before_update => BeforeUpdate,
    after_update => AfterUpdate,
    before_delete => BeforeDelete,
    after_delete => AfterDelete,
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bson::Bson;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::backends::{DocumentCollection, MemoryCollection};
    use crate::error::{ModelError, ValidationErrorKind};
    use crate::field::Field;
    use crate::types::ObjectId;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Account {
        #[serde(rename = "_id", default, skip_serializing_if = "Field::is_undefined")]
        id: Field<ObjectId>,
        email: String,
        #[serde(default)]
        visits: i64,
    }

    impl Model for Account {
        type Id = Field<ObjectId>;

        fn id(&self) -> &Self::Id {
            &self.id
        }

        fn id_mut(&mut self) -> &mut Self::Id {
            &mut self.id
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Admin {
        #[serde(flatten)]
        account: Account,
        level: i32,
    }

    impl Model for Admin {
        type Id = Field<ObjectId>;

        fn id(&self) -> &Self::Id {
            &self.account.id
        }

        fn id_mut(&mut self) -> &mut Self::Id {
            &mut self.account.id
        }
    }

    fn context(phase: TriggerPhase) -> TriggerContext {
        let collection: Arc<dyn DocumentCollection> = Arc::new(MemoryCollection::new("test", "accounts"));
        TriggerContext::new(phase, "Account", collection)
    }

    fn account(email: &str) -> Account {
        Account {
            id: Field::Undefined,
            email: email.to_string(),
            visits: 0,
        }
    }

    #[tokio::test]
    async fn test_run_in_declaration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut set = TriggerSet::new();
        for label in ["first", "second"] {
            let seen = seen.clone();
            set.push(before_save(move |_: &mut Account, _| {
                seen.lock().unwrap().push(label);
                Ok(())
            }));
        }
        let log = seen.clone();
        set.push(after_save(move |_: &mut Account, _| {
            log.lock().unwrap().push("after");
            Ok(())
        }));

        let mut doc = account("a@b.c");
        set.run(TriggerPhase::BeforeSave, &mut doc, &context(TriggerPhase::BeforeSave))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_first_failure_stops_run() {
        let mut set = TriggerSet::new();
        set.push(before_delete(|_: &mut Account, _| Err(ModelError::trigger("locked"))));
        set.push(before_delete(|doc: &mut Account, _| {
            doc.visits = 99;
            Ok(())
        }));

        let mut doc = account("a@b.c");
        let err = set
            .run(TriggerPhase::BeforeDelete, &mut doc, &context(TriggerPhase::BeforeDelete))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Trigger(_)));
        assert_eq!(doc.visits, 0);
    }

    #[tokio::test]
    async fn test_async_callback_sees_context() {
        let mut set = TriggerSet::new();
        set.push(Trigger::new(TriggerPhase::BeforeCreate, |doc: &mut Account, ctx| {
            Box::pin(async move {
                let existing = ctx.count_documents(bson::doc! {}).await?;
                doc.visits = existing as i64 + 1;
                Ok(())
            })
        }));

        let mut doc = account("a@b.c");
        set.run(TriggerPhase::BeforeCreate, &mut doc, &context(TriggerPhase::BeforeCreate))
            .await
            .unwrap();
        assert_eq!(doc.visits, 1);
    }

    #[tokio::test]
    async fn test_validator_transforms_field() {
        let mut set = TriggerSet::new();
        set.push(Trigger::validator_typed(["email"], |email: String| {
            if email.contains('@') {
                Ok(email.to_lowercase())
            } else {
                Err(ValidatorFailure::Value("not an email address".into()))
            }
        }));

        let mut doc = account("A@B.C");
        set.run(TriggerPhase::Validator, &mut doc, &context(TriggerPhase::Validator))
            .await
            .unwrap();
        assert_eq!(doc.email, "a@b.c");

        let mut bad = account("nope");
        let err = set
            .run(TriggerPhase::Validator, &mut bad, &context(TriggerPhase::Validator))
            .await
            .unwrap_err();
        let validation = err.as_validation().unwrap();
        assert_eq!(validation.kind, ValidationErrorKind::Value);
        assert_eq!(validation.loc, vec!["email".to_string()]);
    }

    #[tokio::test]
    async fn test_validator_type_mismatch() {
        let set: TriggerSet<Account> =
            std::iter::once(Trigger::validator_typed(["email"], |n: i64| Ok(n + 1))).collect();
        let mut doc = account("x");
        let err = set
            .run(TriggerPhase::Validator, &mut doc, &context(TriggerPhase::Validator))
            .await
            .unwrap_err();
        assert_eq!(err.validation_kind(), Some(ValidationErrorKind::Type));
    }

    #[test]
    fn test_validator_requires_fields() {
        let trigger: Trigger<Account> = Trigger::validator(Vec::<String>::new(), |v: Bson| Ok(v));
        assert!(matches!(trigger.check("Account"), Err(ModelError::InvalidTrigger { .. })));

        let tagged = before_save(|_: &mut Account, _| Ok(())).with_reference("");
        assert!(tagged.check("Account").is_err());
    }

    #[tokio::test]
    async fn test_lifted_trigger_runs_on_embedding_model() {
        let base: TriggerSet<Account> = [
            before_save(|doc: &mut Account, _| {
                doc.visits += 1;
                Ok(())
            }),
            Trigger::validator_typed(["email"], |email: String| Ok(email.trim().to_string())),
        ]
        .into_iter()
        .collect();

        let lifted: TriggerSet<Admin> = base.lift(|admin: &mut Admin| &mut admin.account);
        assert_eq!(lifted.len(), 2);
        assert!(base.iter().all(|t| lifted.contains(t.id())));

        let mut admin = Admin {
            account: account("  root@host "),
            level: 3,
        };
        let ctx = context(TriggerPhase::BeforeSave);
        lifted.run(TriggerPhase::Validator, &mut admin, &ctx).await.unwrap();
        lifted.run(TriggerPhase::BeforeSave, &mut admin, &ctx).await.unwrap();
        assert_eq!(admin.account.email, "root@host");
        assert_eq!(admin.account.visits, 1);
        assert_eq!(admin.level, 3);
    }

    #[test]
    fn test_matching_is_polymorphic() {
        let set: TriggerSet<Account> = [
            before_save(|_: &mut Account, _| Ok(())),
            Trigger::validator(["email"], Ok),
            after_save(|_: &mut Account, _| Ok(())),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.matching(TriggerPhase::BeforeSave).count(), 2);
        assert_eq!(set.for_phase(TriggerPhase::BeforeSave).count(), 1);
        assert_eq!(set.matching(TriggerPhase::Validator).count(), 1);
    }
}
