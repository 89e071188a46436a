use tracing::{info, instrument};

use shopkit_events::PubSub;
use shopkit_infra::{RecordStore, Session, StoreConfig, parse_key};
use shopkit_core::Value;
use shopkit_shop::{Shop, ShopFields};

use crate::context::Context;
use crate::errors::{HandlerError, HandlerResult};

/// Shop CRUD over the context's database session.
#[derive(Debug, Clone, Default)]
pub struct ShopHandler {
    store: RecordStore<Shop>,
}

impl ShopHandler {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            store: RecordStore::new(config),
        }
    }

    /// Shops matching `filter` (every shop for an empty filter).
    pub fn list_shops<S, P>(&self, ctx: &Context<S, P>, filter: &ShopFields) -> HandlerResult<Vec<Shop>>
    where
        S: Session + ?Sized,
        P: PubSub,
    {
        Ok(self.store.get(ctx.session(), filter)?)
    }

    #[instrument(skip(self, ctx, shop), fields(request_id = %ctx.request_id(), shop_id = shop.id), err)]
    pub fn create_shop<S, P>(&self, ctx: &Context<S, P>, shop: &Shop) -> HandlerResult<Vec<Shop>>
    where
        S: Session + ?Sized,
        P: PubSub,
    {
        let created = self.store.create(ctx.session(), shop)?;
        info!("shop created");
        Ok(created)
    }

    /// Merge `fields` into the stored shop. The `id` path parameter, when
    /// present, identifies the shop and overrides any id in `fields`.
    #[instrument(skip(self, ctx, fields), fields(request_id = %ctx.request_id()), err)]
    pub fn update_shop<S, P>(&self, ctx: &Context<S, P>, fields: &ShopFields) -> HandlerResult<Vec<Shop>>
    where
        S: Session + ?Sized,
        P: PubSub,
    {
        let mut patch = fields.clone();
        if ctx.path_param("id").is_some() {
            patch.id = Some(shop_id(ctx)?);
        }
        if patch.id.is_none() {
            return Err(HandlerError::MissingParam("id".to_string()));
        }
        Ok(self.store.update(ctx.session(), &patch)?)
    }

    /// Delete the shop named by the `id` path parameter.
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()), err)]
    pub fn delete_shop<S, P>(&self, ctx: &Context<S, P>) -> HandlerResult<()>
    where
        S: Session + ?Sized,
        P: PubSub,
    {
        let id = shop_id(ctx)?;
        self.store.delete(ctx.session(), &Value::from(id))?;
        info!(shop_id = id, "shop deleted");
        Ok(())
    }
}

fn shop_id<S, P>(ctx: &Context<S, P>) -> HandlerResult<i32>
where
    S: Session + ?Sized,
    P: PubSub,
{
    let raw = ctx.require_param("id")?;
    match parse_key(raw) {
        Value::Int(id) => i32::try_from(id).map_err(|_| HandlerError::invalid_param("id", raw)),
        Value::Text(_) => Err(HandlerError::invalid_param("id", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use shopkit_core::DataError;
    use shopkit_events::NullPubSub;
    use shopkit_infra::{DeletePolicy, InMemorySession};

    fn ctx() -> Context<InMemorySession, NullPubSub> {
        let session = Arc::new(InMemorySession::new());
        session.create_table_for::<Shop>().unwrap();
        Context::new(session, Arc::new(NullPubSub))
    }

    #[test]
    fn crud_through_path_params() {
        let handler = ShopHandler::default();
        let ctx = ctx();

        handler
            .create_shop(&ctx, &Shop::new(2, "Shubh", "HSR", "Karnataka"))
            .unwrap();

        let ctx = ctx.with_path_params([("id", "2")]);
        let updated = handler
            .update_shop(&ctx, &ShopFields::any().location("Gaya").state("Bihar"))
            .unwrap();
        assert_eq!(updated, vec![Shop::new(2, "Shubh", "Gaya", "Bihar")]);

        handler.delete_shop(&ctx).unwrap();
        assert!(handler.list_shops(&ctx, &ShopFields::any()).unwrap().is_empty());
    }

    #[test]
    fn non_numeric_id_is_an_invalid_param() {
        let handler = ShopHandler::default();
        let ctx = ctx().with_path_params([("id", "abc")]);

        assert_eq!(
            handler.delete_shop(&ctx),
            Err(HandlerError::invalid_param("id", "abc"))
        );
        assert_eq!(
            handler.update_shop(&ctx, &ShopFields::any().name("x")).unwrap_err().code(),
            "invalid_param"
        );
    }

    #[test]
    fn update_needs_an_id_from_somewhere() {
        let handler = ShopHandler::default();
        assert_eq!(
            handler.update_shop(&ctx(), &ShopFields::any().name("x")),
            Err(HandlerError::MissingParam("id".into()))
        );
    }

    #[test]
    fn delete_policy_comes_from_configuration() {
        let ctx = ctx().with_path_params([("id", "9")]);

        assert_eq!(ShopHandler::default().delete_shop(&ctx), Ok(()));

        let strict = ShopHandler::new(StoreConfig {
            delete_policy: DeletePolicy::RequireExisting,
        });
        assert_eq!(
            strict.delete_shop(&ctx),
            Err(HandlerError::Data(DataError::not_found("9")))
        );
    }
}
