use kube::CustomResourceExt as _;
use platform_core::api::v1::ObservabilityPlatform;

fn main() {
    print!("{}", serde_yaml::to_string(&ObservabilityPlatform::crd()).unwrap());
}
