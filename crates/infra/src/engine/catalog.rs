//! Seller registration and the customer/product catalog.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use billbook_core::{CustomerId, ProductId, SellerId};
use billbook_events::Actor;
use billbook_inventory::{NewProduct, Product, ProductEvent, ProductUpdate, StockReceived};
use billbook_parties::{
    Customer, CustomerUpdate, NewCustomer, NewSeller, Seller, SellerUpdate, normalize_email,
};

use super::{BillingEngine, name_matches, owned_customer, owned_product, record, require_seller};
use crate::allocator;
use crate::error::EngineError;
use crate::ledger;
use crate::store::{BillingStore, StoreTx};

/// Validate, check the global email rule, allocate an id and insert.
pub(crate) async fn insert_new_customer(
    tx: &mut dyn StoreTx,
    actor: &Actor,
    seller_id: SellerId,
    payload: NewCustomer,
    now: DateTime<Utc>,
) -> Result<Customer, EngineError> {
    let payload = payload.validated()?;
    if tx.find_customer_by_email(&payload.email).await?.is_some() {
        return Err(EngineError::DuplicateEmail(payload.email));
    }
    let id = allocator::customer_id(tx).await?;
    let (customer, event) = Customer::create(id, seller_id, payload)?;
    tx.insert_customer(&customer).await?;
    record(tx, actor, &event, now).await?;
    Ok(customer)
}

pub(crate) async fn insert_new_product(
    tx: &mut dyn StoreTx,
    actor: &Actor,
    seller_id: SellerId,
    payload: NewProduct,
    now: DateTime<Utc>,
) -> Result<Product, EngineError> {
    let id = allocator::product_id(tx).await?;
    let (product, event) = Product::create(id, seller_id, payload)?;
    tx.insert_product(&product).await?;
    record(tx, actor, &event, now).await?;
    Ok(product)
}

impl<S: BillingStore> BillingEngine<S> {
    #[instrument(skip(self, payload), err)]
    pub async fn register_seller(&self, payload: NewSeller) -> Result<Seller, EngineError> {
        self.run("register_seller", move || self.register_seller_once(payload.clone()))
            .await
    }

    async fn register_seller_once(&self, payload: NewSeller) -> Result<Seller, EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;

        let email = normalize_email(&payload.email)?;
        if tx.find_seller_by_email(&email).await?.is_some() {
            return Err(EngineError::DuplicateEmail(email));
        }

        let id = allocator::seller_id(&mut *tx).await?;
        let (seller, event) = Seller::register(id, payload)?;
        tx.insert_seller(&seller).await?;
        record(&mut *tx, &Actor::seller(id), &event, now).await?;
        tx.commit().await?;

        info!(seller_id = %id, "seller registered");
        Ok(seller)
    }

    #[instrument(skip(self), err)]
    pub async fn get_seller(&self, seller_id: SellerId) -> Result<Seller, EngineError> {
        self.run("get_seller", move || self.get_seller_once(seller_id))
            .await
    }

    async fn get_seller_once(&self, seller_id: SellerId) -> Result<Seller, EngineError> {
        let mut tx = self.store.begin_read().await?;
        require_seller(&mut *tx, seller_id).await
    }

    /// Update a seller's profile. A changed email must stay unique among sellers.
    #[instrument(skip(self, update), err)]
    pub async fn update_seller(
        &self,
        seller_id: SellerId,
        update: SellerUpdate,
    ) -> Result<Seller, EngineError> {
        self.run("update_seller", move || {
            self.update_seller_once(seller_id, update.clone())
        })
        .await
    }

    async fn update_seller_once(
        &self,
        seller_id: SellerId,
        update: SellerUpdate,
    ) -> Result<Seller, EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let mut seller = require_seller(&mut *tx, seller_id).await?;

        let (changed_email, event) = seller.apply_update(update)?;
        if let Some(email) = changed_email {
            if let Some(holder) = tx.find_seller_by_email(&email).await? {
                if holder.id != seller_id {
                    return Err(EngineError::DuplicateEmail(email));
                }
            }
        }

        tx.update_seller(&seller).await?;
        record(&mut *tx, &Actor::seller(seller_id), &event, now).await?;
        tx.commit().await?;
        Ok(seller)
    }

    /// Delete a seller along with its customers and products. Refused while
    /// the seller still owns invoices.
    #[instrument(skip(self), err)]
    pub async fn delete_seller(&self, seller_id: SellerId) -> Result<(), EngineError> {
        self.run("delete_seller", move || self.delete_seller_once(seller_id))
            .await
    }

    async fn delete_seller_once(&self, seller_id: SellerId) -> Result<(), EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let seller = require_seller(&mut *tx, seller_id).await?;

        let invoices = tx.seller_invoice_count(seller_id).await?;
        if invoices > 0 {
            return Err(EngineError::InvalidState(format!(
                "seller {seller_id} still has {invoices} invoice(s)"
            )));
        }

        tx.delete_seller(seller_id).await?;
        record(
            &mut *tx,
            &Actor::seller(seller_id),
            &seller.deleted_event(),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(%seller_id, "seller deleted");
        Ok(())
    }

    // customers

    #[instrument(skip(self, payload), err)]
    pub async fn add_customer(
        &self,
        seller_id: SellerId,
        payload: NewCustomer,
    ) -> Result<Customer, EngineError> {
        self.run("add_customer", move || {
            self.add_customer_once(seller_id, payload.clone())
        })
        .await
    }

    async fn add_customer_once(
        &self,
        seller_id: SellerId,
        payload: NewCustomer,
    ) -> Result<Customer, EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        require_seller(&mut *tx, seller_id).await?;
        let customer =
            insert_new_customer(&mut *tx, &Actor::seller(seller_id), seller_id, payload, now)
                .await?;
        tx.commit().await?;

        info!(customer_id = %customer.id, "customer added");
        Ok(customer)
    }

    /// Update contact details. A changed email must stay unique across sellers.
    #[instrument(skip(self, update), err)]
    pub async fn update_customer(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
        update: CustomerUpdate,
    ) -> Result<Customer, EngineError> {
        self.run("update_customer", move || {
            self.update_customer_once(seller_id, customer_id, update.clone())
        })
        .await
    }

    async fn update_customer_once(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
        update: CustomerUpdate,
    ) -> Result<Customer, EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let mut customer = owned_customer(&mut *tx, seller_id, customer_id).await?;

        let (changed_email, event) = customer.apply_update(update)?;
        if let Some(email) = changed_email {
            if let Some(holder) = tx.find_customer_by_email(&email).await? {
                if holder.id != customer_id {
                    return Err(EngineError::DuplicateEmail(email));
                }
            }
        }

        tx.update_customer(&customer).await?;
        record(&mut *tx, &Actor::seller(seller_id), &event, now).await?;
        tx.commit().await?;
        Ok(customer)
    }

    /// Delete a customer that no invoice references.
    #[instrument(skip(self), err)]
    pub async fn delete_customer(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
    ) -> Result<(), EngineError> {
        self.run("delete_customer", move || {
            self.delete_customer_once(seller_id, customer_id)
        })
        .await
    }

    async fn delete_customer_once(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
    ) -> Result<(), EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let customer = owned_customer(&mut *tx, seller_id, customer_id).await?;

        let invoices = tx.customer_invoice_count(customer_id).await?;
        if invoices > 0 {
            return Err(EngineError::InvalidState(format!(
                "customer {customer_id} still has {invoices} invoice(s)"
            )));
        }

        tx.delete_customer(customer_id).await?;
        record(
            &mut *tx,
            &Actor::seller(seller_id),
            &customer.deleted_event(),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(%customer_id, "customer deleted");
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn get_customer(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
    ) -> Result<Customer, EngineError> {
        self.run("get_customer", move || {
            self.get_customer_once(seller_id, customer_id)
        })
        .await
    }

    async fn get_customer_once(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
    ) -> Result<Customer, EngineError> {
        let mut tx = self.store.begin_read().await?;
        owned_customer(&mut *tx, seller_id, customer_id).await
    }

    /// Customers of a seller in id order, optionally filtered by name.
    #[instrument(skip(self), err)]
    pub async fn list_customers(
        &self,
        seller_id: SellerId,
        name_contains: Option<&str>,
    ) -> Result<Vec<Customer>, EngineError> {
        self.run("list_customers", move || {
            self.list_customers_once(seller_id, name_contains)
        })
        .await
    }

    async fn list_customers_once(
        &self,
        seller_id: SellerId,
        name_contains: Option<&str>,
    ) -> Result<Vec<Customer>, EngineError> {
        let mut tx = self.store.begin_read().await?;
        let mut customers = tx.list_customers(seller_id).await?;
        customers.retain(|c| name_matches(&c.name, name_contains));
        Ok(customers)
    }

    // products

    #[instrument(skip(self, payload), err)]
    pub async fn add_product(
        &self,
        seller_id: SellerId,
        payload: NewProduct,
    ) -> Result<Product, EngineError> {
        self.run("add_product", move || {
            self.add_product_once(seller_id, payload.clone())
        })
        .await
    }

    async fn add_product_once(
        &self,
        seller_id: SellerId,
        payload: NewProduct,
    ) -> Result<Product, EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        require_seller(&mut *tx, seller_id).await?;
        let product =
            insert_new_product(&mut *tx, &Actor::seller(seller_id), seller_id, payload, now)
                .await?;
        tx.commit().await?;

        info!(product_id = %product.id, stock = product.stock, "product added");
        Ok(product)
    }

    /// Change name, price or description. Existing invoice lines keep the
    /// price they were created with.
    #[instrument(skip(self, update), err)]
    pub async fn update_product(
        &self,
        seller_id: SellerId,
        product_id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, EngineError> {
        self.run("update_product", move || {
            self.update_product_once(seller_id, product_id, update.clone())
        })
        .await
    }

    async fn update_product_once(
        &self,
        seller_id: SellerId,
        product_id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let mut product = owned_product(&mut *tx, seller_id, product_id).await?;
        let event = product.apply_update(update)?;
        tx.update_product_details(&product).await?;
        record(&mut *tx, &Actor::seller(seller_id), &event, now).await?;
        tx.commit().await?;
        Ok(product)
    }

    /// Delete a product that no invoice line references.
    #[instrument(skip(self), err)]
    pub async fn delete_product(
        &self,
        seller_id: SellerId,
        product_id: ProductId,
    ) -> Result<(), EngineError> {
        self.run("delete_product", move || {
            self.delete_product_once(seller_id, product_id)
        })
        .await
    }

    async fn delete_product_once(
        &self,
        seller_id: SellerId,
        product_id: ProductId,
    ) -> Result<(), EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let product = owned_product(&mut *tx, seller_id, product_id).await?;

        let lines = tx.product_reference_count(product_id).await?;
        if lines > 0 {
            return Err(EngineError::InvalidState(format!(
                "product {product_id} is used on {lines} invoice line(s)"
            )));
        }

        tx.delete_product(product_id).await?;
        record(
            &mut *tx,
            &Actor::seller(seller_id),
            &product.deleted_event(),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(%product_id, "product deleted");
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn get_product(
        &self,
        seller_id: SellerId,
        product_id: ProductId,
    ) -> Result<Product, EngineError> {
        self.run("get_product", move || {
            self.get_product_once(seller_id, product_id)
        })
        .await
    }

    async fn get_product_once(
        &self,
        seller_id: SellerId,
        product_id: ProductId,
    ) -> Result<Product, EngineError> {
        let mut tx = self.store.begin_read().await?;
        owned_product(&mut *tx, seller_id, product_id).await
    }

    /// Products of a seller in id order, optionally filtered by name.
    #[instrument(skip(self), err)]
    pub async fn list_products(
        &self,
        seller_id: SellerId,
        name_contains: Option<&str>,
    ) -> Result<Vec<Product>, EngineError> {
        self.run("list_products", move || {
            self.list_products_once(seller_id, name_contains)
        })
        .await
    }

    async fn list_products_once(
        &self,
        seller_id: SellerId,
        name_contains: Option<&str>,
    ) -> Result<Vec<Product>, EngineError> {
        let mut tx = self.store.begin_read().await?;
        let mut products = tx.list_products(seller_id).await?;
        products.retain(|p| name_matches(&p.name, name_contains));
        Ok(products)
    }

    /// Record a receipt of goods: `quantity` units go back on the shelf.
    #[instrument(skip(self), err)]
    pub async fn restock(
        &self,
        seller_id: SellerId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Product, EngineError> {
        self.run("restock", move || {
            self.restock_once(seller_id, product_id, quantity)
        })
        .await
    }

    async fn restock_once(
        &self,
        seller_id: SellerId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Product, EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let mut product = owned_product(&mut *tx, seller_id, product_id).await?;

        product.stock = ledger::release(&mut *tx, product_id, quantity).await?;
        let event = ProductEvent::StockReceived(StockReceived {
            product_id,
            quantity,
            new_stock: product.stock,
        });
        record(&mut *tx, &Actor::seller(seller_id), &event, now).await?;
        tx.commit().await?;

        info!(%product_id, quantity, stock = product.stock, "stock received");
        Ok(product)
    }
}
