fn main() {
    doas_rs::doas_main()
}
