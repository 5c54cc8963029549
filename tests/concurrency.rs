//! Many customers racing for limited stock.

use std::sync::Arc;

use opensase_storefront::{
    domain::{
        aggregates::{Caller, NewAddress, NewProduct},
        value_objects::{Category, Quantity, Role},
    },
    publisher::EventPublisher,
    store::{MemoryStore, Store},
    OrderPolicy, Storefront,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stock_never_goes_negative_under_contention() {
    let store = Arc::new(MemoryStore::new());
    let shop = Storefront::new(store.clone(), EventPublisher::disabled(), OrderPolicy::default());

    let manager = shop.identify("ops@shop.test", None).await.unwrap();
    store.set_role(manager.id, Role::Manager).await.unwrap();
    let manager = Caller { user_id: manager.id, role: Role::Manager };
    let product = shop
        .create_product(&manager, NewProduct { name: "Limited print".into(), description: String::new(), price: "49.99".parse().unwrap(), stock: 5, category: Category::Other })
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let shop = shop.clone();
        let product_id = product.id;
        tasks.push(tokio::spawn(async move {
            let user = shop.identify(&format!("buyer{i}@shop.test"), None).await.unwrap();
            let caller = Caller::from(&user);
            let address = shop
                .add_address(&caller, NewAddress { street: format!("{i} Allen Ave"), city: "Ikeja".into(), state: "LA".into(), postal_code: "100271".into(), country: "NG".into(), is_default: true })
                .await
                .unwrap();
            shop.add_to_cart(&caller, product_id, Quantity::new(1).unwrap()).await.unwrap();
            shop.place_order(&caller, address.id).await
        }));
    }

    let mut placed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => placed += 1,
            Err(e) => assert_eq!(e.code(), "INSUFFICIENT_STOCK"),
        }
    }

    assert_eq!(placed, 5);
    assert_eq!(shop.product(product.id).await.unwrap().product.stock, 0);
    assert_eq!(shop.orders(&manager).await.unwrap().len(), 5);
}
