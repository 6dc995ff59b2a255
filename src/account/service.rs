//! Account Service
//!
//! Opens accounts and answers account queries. Account numbers are generated
//! randomly and checked for uniqueness with a bounded number of attempts.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::models::{Account, AccountBalance, AccountId};
use super::validation::{AccountNumber, HolderName, TaxId};
use crate::context::RequestContext;
use crate::error::{LedgerError, ValidationError};
use crate::events::EventSink;
use crate::money::Balance;
use crate::store::AccountRepository;

/// Default cap on account number generation attempts
pub const DEFAULT_NUMBER_ATTEMPTS: u32 = 10;

type NumberGenerator = Box<dyn Fn() -> AccountNumber + Send + Sync>;

/// Request to open an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub holder_name: String,
    pub tax_id: String,
    #[serde(default)]
    pub initial_balance: Option<Decimal>,
}

impl CreateAccountRequest {
    pub fn new(holder_name: impl Into<String>, tax_id: impl Into<String>) -> Self {
        Self {
            holder_name: holder_name.into(),
            tax_id: tax_id.into(),
            initial_balance: None,
        }
    }

    pub fn with_initial_balance(mut self, balance: Decimal) -> Self {
        self.initial_balance = Some(balance);
        self
    }
}

pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
    events: Arc<dyn EventSink>,
    max_number_attempts: u32,
    generate_number: NumberGenerator,
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountRepository>, events: Arc<dyn EventSink>) -> Self {
        Self {
            accounts,
            events,
            max_number_attempts: DEFAULT_NUMBER_ATTEMPTS,
            generate_number: Box::new(|| AccountNumber::generate(&mut rand::thread_rng())),
        }
    }

    pub fn with_max_number_attempts(mut self, attempts: u32) -> Self {
        self.max_number_attempts = attempts.max(1);
        self
    }

    /// Replace the random account number source
    pub fn with_number_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> AccountNumber + Send + Sync + 'static,
    {
        self.generate_number = Box::new(generator);
        self
    }

    /// Open a new account and publish `AccountCreated`
    ///
    /// # Errors
    /// - `InvalidArgument`: bad holder name, tax id, or negative initial balance
    /// - `DuplicateTaxId`: the tax id already owns an account
    /// - `GenerationExhausted`: no free account number within the attempt cap
    pub async fn open_account(
        &self,
        req: CreateAccountRequest,
        ctx: &RequestContext,
    ) -> Result<Account, LedgerError> {
        let holder_name = HolderName::new(&req.holder_name)?;
        let tax_id = TaxId::parse(&req.tax_id)?;
        let initial_balance = req.initial_balance.map(Balance::new);

        if let Some(balance) = initial_balance
            && balance.is_negative()
        {
            return Err(ValidationError::NegativeInitialBalance(balance.value()).into());
        }

        if ctx.run(self.accounts.exists_by_tax_id(&tax_id)).await? {
            return Err(LedgerError::DuplicateTaxId(tax_id.formatted()));
        }

        let number = self.unique_account_number(ctx).await?;
        let (account, created) = Account::open(number, holder_name, tax_id, initial_balance)?;
        let account = ctx.run(self.accounts.save(&account)).await?;

        if let Err(e) = ctx.run(self.events.publish(created)).await {
            error!(account_id = %account.id(), code = e.code(), "Event dispatch failed: {}", e);
        }

        info!(
            account_id = %account.id(),
            account_number = %account.number(),
            balance = %account.balance(),
            "Account opened"
        );
        Ok(account)
    }

    pub async fn get_account(
        &self,
        id: AccountId,
        ctx: &RequestContext,
    ) -> Result<Account, LedgerError> {
        ctx.run(self.accounts.find_by_id(id))
            .await?
            .ok_or_else(|| LedgerError::account_not_found(&id))
    }

    /// Balance of an active account
    pub async fn get_balance(
        &self,
        id: AccountId,
        ctx: &RequestContext,
    ) -> Result<AccountBalance, LedgerError> {
        let account = self.get_account(id, ctx).await?;
        if !account.is_active() {
            return Err(LedgerError::InactiveAccount(id));
        }

        Ok(AccountBalance {
            account_id: account.id(),
            account_number: account.number().clone(),
            balance: account.balance(),
        })
    }

    pub async fn deactivate_account(
        &self,
        id: AccountId,
        ctx: &RequestContext,
    ) -> Result<Account, LedgerError> {
        let mut account = self.get_account(id, ctx).await?;
        account.deactivate()?;
        let account = ctx.run(self.accounts.save(&account)).await?;
        info!(account_id = %id, "Account deactivated");
        Ok(account)
    }

    pub async fn activate_account(
        &self,
        id: AccountId,
        ctx: &RequestContext,
    ) -> Result<Account, LedgerError> {
        let mut account = self.get_account(id, ctx).await?;
        account.activate();
        let account = ctx.run(self.accounts.save(&account)).await?;
        info!(account_id = %id, "Account activated");
        Ok(account)
    }

    async fn unique_account_number(
        &self,
        ctx: &RequestContext,
    ) -> Result<AccountNumber, LedgerError> {
        for attempt in 1..=self.max_number_attempts {
            let candidate = (self.generate_number)();
            if !ctx.run(self.accounts.exists_by_number(&candidate)).await? {
                return Ok(candidate);
            }
            debug!(attempt, account_number = %candidate, "Account number taken, retrying");
        }

        Err(LedgerError::GenerationExhausted {
            what: "account number",
            attempts: self.max_number_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use crate::store::InMemoryLedgerStore;
    use std::time::Duration;

    const TAX_ID: &str = "529.982.247-25";

    fn ctx() -> RequestContext {
        RequestContext::with_timeout(Duration::from_secs(5))
    }

    fn service() -> (AccountService, Arc<InMemoryLedgerStore>, Arc<RecordingEventSink>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let sink = Arc::new(RecordingEventSink::new());
        (AccountService::new(store.clone(), sink.clone()), store, sink)
    }

    #[tokio::test]
    async fn test_open_account_persists_and_publishes() {
        let (service, store, sink) = service();

        let account = service
            .open_account(
                CreateAccountRequest::new("ana souza", TAX_ID)
                    .with_initial_balance(Decimal::new(10050, 2)),
                &ctx(),
            )
            .await
            .unwrap();

        assert_eq!(account.balance(), Balance::parse("100.50").unwrap());
        assert_eq!(account.version(), 1);
        assert_eq!(store.account_count().await, 1);
        assert_eq!(sink.event_types(), vec!["ACCOUNT_CREATED"]);

        let balance = service.get_balance(account.id(), &ctx()).await.unwrap();
        assert_eq!(balance.account_number, *account.number());
    }

    #[tokio::test]
    async fn test_duplicate_tax_id_rejected() {
        let (service, _, _) = service();
        service
            .open_account(CreateAccountRequest::new("Ana Souza", TAX_ID), &ctx())
            .await
            .unwrap();

        let err = service
            .open_account(CreateAccountRequest::new("Bia Lima", "52998224725"), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_TAX_ID");
        assert_eq!(err.http_status(), 409);
    }

    #[tokio::test]
    async fn test_invalid_inputs_rejected() {
        let (service, store, sink) = service();

        let err = service
            .open_account(CreateAccountRequest::new("Ana", TAX_ID), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_LAST_NAME");

        let err = service
            .open_account(
                CreateAccountRequest::new("Ana Souza", TAX_ID)
                    .with_initial_balance(Decimal::new(-1, 2)),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NEGATIVE_INITIAL_BALANCE");

        assert_eq!(store.account_count().await, 0);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_number_generation_exhausted() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let sink = Arc::new(RecordingEventSink::new());
        let fixed = || AccountNumber::parse("12345679").unwrap();
        let service = AccountService::new(store.clone(), sink)
            .with_number_generator(fixed)
            .with_max_number_attempts(3);

        service
            .open_account(CreateAccountRequest::new("Ana Souza", TAX_ID), &ctx())
            .await
            .unwrap();

        let err = service
            .open_account(
                CreateAccountRequest::new("Bia Lima", "111.444.777-35"),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::GenerationExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_deactivate_and_balance_query() {
        let (service, _, _) = service();
        let account = service
            .open_account(CreateAccountRequest::new("Ana Souza", TAX_ID), &ctx())
            .await
            .unwrap();

        let closed = service.deactivate_account(account.id(), &ctx()).await.unwrap();
        assert!(!closed.is_active());

        let err = service.get_balance(account.id(), &ctx()).await.unwrap_err();
        assert!(matches!(err, LedgerError::InactiveAccount(_)));

        let reopened = service.activate_account(account.id(), &ctx()).await.unwrap();
        assert!(reopened.is_active());
        assert_eq!(reopened.version(), 3);
    }

    #[tokio::test]
    async fn test_deactivate_with_funds_refused() {
        let (service, _, _) = service();
        let account = service
            .open_account(
                CreateAccountRequest::new("Ana Souza", TAX_ID)
                    .with_initial_balance(Decimal::ONE),
                &ctx(),
            )
            .await
            .unwrap();

        let err = service
            .deactivate_account(account.id(), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ILLEGAL_STATE");
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let (service, _, _) = service();
        let err = service
            .get_account(AccountId::new(), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[tokio::test]
    async fn test_storage_failure_publishes_nothing() {
        let (service, store, sink) = service();
        store.set_fail_account_saves(true);

        let err = service
            .open_account(CreateAccountRequest::new("Ana Souza", TAX_ID), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert!(err.is_retriable());
        assert!(sink.events().is_empty());
    }
}
